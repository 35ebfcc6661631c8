//! Metrics collection and monitoring for rowguard
//!
//! Counters are registered once in a crate-owned Prometheus registry. Recording
//! is passive: when metrics are disabled, or registration failed, every
//! recording call is a no-op.

use crate::core::config::MetricsConfig;
use crate::core::error::Result;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry, HistogramVec, IntCounterVec, IntGauge, Registry,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Global metrics registry
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Recording switch, flipped by [`init_registry`]
static ENABLED: AtomicBool = AtomicBool::new(true);

/// Centralized metrics for DataStore operations and sessions
pub struct Metrics {
    /// Completed DataStore operations by operation name
    pub operations: IntCounterVec,
    /// Operations refused by the restricted query builder
    pub access_denied: IntCounterVec,
    /// Operations that failed in the storage backend
    pub storage_errors: IntCounterVec,
    /// Sessions currently checked out
    pub active_sessions: IntGauge,
    /// Histogram of operation durations in seconds
    pub operation_duration: HistogramVec,
}

impl Metrics {
    /// Create and register a new metrics instance
    fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            operations: register_int_counter_vec_with_registry!(
                "rowguard_operations_total",
                "Total number of DataStore operations",
                &["operation"],
                registry
            )?,
            access_denied: register_int_counter_vec_with_registry!(
                "rowguard_access_denied_total",
                "Total number of operations refused by access control",
                &["operation"],
                registry
            )?,
            storage_errors: register_int_counter_vec_with_registry!(
                "rowguard_storage_errors_total",
                "Total number of storage backend failures",
                &["operation"],
                registry
            )?,
            active_sessions: register_int_gauge_with_registry!(
                "rowguard_active_sessions",
                "Number of sessions currently checked out",
                registry
            )?,
            operation_duration: register_histogram_vec_with_registry!(
                "rowguard_operation_duration_seconds",
                "Duration of DataStore operations in seconds",
                &["operation"],
                vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
                registry
            )?,
        })
    }

    /// Get the global metrics instance, if registration succeeded
    pub fn global() -> Option<&'static Metrics> {
        static INSTANCE: Lazy<Option<Metrics>> = Lazy::new(|| match Metrics::new(&REGISTRY) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                tracing::warn!("Failed to register metrics: {}", e);
                None
            }
        });
        INSTANCE.as_ref()
    }
}

fn active() -> Option<&'static Metrics> {
    if ENABLED.load(Ordering::Relaxed) {
        Metrics::global()
    } else {
        None
    }
}

/// Timer for measuring operation duration with automatic histogram recording
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start a new timer for the named operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }

    /// Record the elapsed time and consume the timer
    pub fn finish(self) {
        if let Some(metrics) = active() {
            metrics
                .operation_duration
                .with_label_values(&[self.operation])
                .observe(self.start.elapsed().as_secs_f64());
        }
    }
}

/// Count one completed operation
pub fn record_operation(operation: &str) {
    if let Some(metrics) = active() {
        metrics.operations.with_label_values(&[operation]).inc();
    }
}

/// Count one access-control refusal
pub fn record_access_denied(operation: &str) {
    if let Some(metrics) = active() {
        metrics.access_denied.with_label_values(&[operation]).inc();
    }
}

/// Count one storage failure
pub fn record_storage_error(operation: &str) {
    if let Some(metrics) = active() {
        metrics.storage_errors.with_label_values(&[operation]).inc();
    }
}

/// Track a session checkout
pub fn session_opened() {
    if let Some(metrics) = active() {
        metrics.active_sessions.inc();
    }
}

/// Track a session release
pub fn session_closed() {
    if let Some(metrics) = active() {
        metrics.active_sessions.dec();
    }
}

/// Initialize the metrics registry according to configuration
///
/// Safe to call more than once; the last call decides whether recording is on.
pub fn init_registry(config: &MetricsConfig) {
    ENABLED.store(config.enabled, Ordering::Relaxed);
    if config.enabled {
        let _ = Metrics::global();
    }
}

/// Get the Prometheus registry for serving metrics to monitoring systems
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Collect and return all metrics as a Prometheus-formatted string
pub fn gather() -> Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = registry().gather();
    Ok(encoder.encode_to_string(&metric_families)?)
}
