//! Rowguard - Document Persistence with Row-Level Access Control
//!
//! Rowguard persists JSON documents through a pluggable query builder.
//! Every read and write is translated into a filter and update document by
//! the builder bound to the current [`DataStore`]; the restricted builder
//! folds the caller's permissions into those documents, so access control
//! is enforced by query rewriting rather than by the database.
#![warn(missing_docs)]

// Core foundational modules
pub mod core;

// Entity model and built-in entities
pub mod model;
pub mod entities;

// Query construction and execution
pub mod query;
pub mod datastore;

// Infrastructure
pub mod storage;
pub mod security;
pub mod system;

// Re-export commonly used items for convenience
pub use crate::core::{Config, Document, Error, Result};
pub use datastore::{DataStore, RelationalDataStore, Store};
pub use model::{Entity, Model};
pub use query::{QueryBuilder, RestrictedQueryBuilder, UnrestrictedQueryBuilder};
pub use security::{Acl, CallerIdentity};
pub use storage::Database;

use crate::core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Install the tracing subscriber described by `config`
///
/// `RUST_LOG` takes precedence over the configured level. A subscriber
/// installed earlier is left in place.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::config(format!("Invalid log level {}: {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.pretty().try_init(),
    };

    if installed.is_ok() {
        tracing::info!("Initializing {} v{}", NAME, VERSION);
    }
    Ok(())
}

/// Initialize logging and metrics from a loaded configuration
pub fn init_with_config(config: &Config) -> Result<()> {
    init(&config.logging)?;
    system::metrics::init_registry(&config.metrics);
    Ok(())
}

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
