//! System utilities and monitoring
//!
//! This module contains the metrics registry shared by the storage layer and
//! the DataStore.

pub mod metrics;
