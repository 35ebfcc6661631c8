//! Core system types and foundations
//!
//! This module contains the fundamental building blocks of rowguard:
//! shared document types, error handling and configuration.

pub mod types;
pub mod error;
pub mod config;

// Re-export commonly used items
pub use types::{Document, Timestamp, IdSource, ObjectIdSource};
pub use error::{Error, Result, StorageError};
pub use config::Config;
