//! Storage and persistence layer
//!
//! A [`DocumentBackend`] executes the filters and update documents produced
//! by the query builders. It knows nothing about access control: every
//! permission clause has already been folded into the filter it receives.

pub mod factory;
pub mod matcher;
pub mod memory;
pub mod session;

pub use factory::create_backend;
pub use memory::MemoryBackend;
pub use session::{Database, Session};

use crate::core::{Document, StorageError};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Result type for backend operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Lazily produced query results
pub type DocumentStream = BoxStream<'static, StorageResult<Document>>;

/// Options for [`DocumentBackend::find`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Sort fields; a leading `-` sorts descending
    pub sort: Vec<String>,
    /// Maximum number of documents to produce; `None` streams every match
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Options with sort fields and no limit
    pub fn sorted(sort: &[&str]) -> Self {
        Self {
            sort: sort.iter().map(|s| s.to_string()).collect(),
            limit: None,
        }
    }

    /// Options with sort fields and a limit
    pub fn new(sort: &[&str], limit: usize) -> Self {
        Self {
            sort: sort.iter().map(|s| s.to_string()).collect(),
            limit: Some(limit),
        }
    }
}

/// Atomic find-and-modify request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Change {
    /// Update document (`$set`, `$unset`, `$inc`, `$setOnInsert`)
    pub update: Document,
    /// Create the document when nothing matches
    pub upsert: bool,
    /// Return the document after the update instead of before
    pub return_new: bool,
}

/// Result of a find-and-modify
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModifyOutcome {
    /// Matched document (post-image when `return_new`), `None` if nothing matched
    pub document: Option<Document>,
    /// True when the upsert created the document
    pub created: bool,
}

/// Document database operations used by the DataStore
///
/// Implementations must apply each `find_and_modify` atomically with respect
/// to every other write on the same collection.
#[async_trait]
pub trait DocumentBackend: Send + Sync + std::fmt::Debug {
    /// Insert documents; fails without inserting anything if an `_id` is taken
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> StorageResult<()>;

    /// Stream the documents matching `filter`
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StorageResult<DocumentStream>;

    /// First document matching `filter`
    async fn find_one(&self, collection: &str, filter: Document) -> StorageResult<Option<Document>>;

    /// Number of documents matching `filter`
    async fn count(&self, collection: &str, filter: Document) -> StorageResult<u64>;

    /// Apply `change` to the first document matching `filter` as one atomic step
    async fn find_and_modify(
        &self,
        collection: &str,
        filter: Document,
        change: Change,
    ) -> StorageResult<ModifyOutcome>;

    /// Remove the first document matching `filter`; false if none matched
    async fn remove_one(&self, collection: &str, filter: Document) -> StorageResult<bool>;

    /// Remove every document matching `filter`, returning how many
    async fn remove_many(&self, collection: &str, filter: Document) -> StorageResult<u64>;
}
