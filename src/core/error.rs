//! Error types and handling for rowguard
//!
//! Every fallible operation in the crate returns [`Result`]. Storage backend
//! failures travel through [`Error::Storage`] unchanged so callers can tell a
//! permission failure apart from a connectivity or constraint failure.

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rowguard
#[derive(Error, Debug)]
pub enum Error {
    /// The operation needs a persisted id but the entity has none
    #[error("No id provided for object")]
    MissingIdentity,

    /// Insert attempted on an entity that already carries an id
    #[error("Cannot insert existing object: {0}")]
    AlreadyExists(String),

    /// Write, bulk delete or relation write refused for the caller
    #[error("Permission denied: {0}")]
    AccessDenied(String),

    /// Relation save attempted before the owner was persisted
    #[error("Cannot add related objects to an unsaved object")]
    UnsavedOwner,

    /// Relation save attempted with an unpersisted related entity
    #[error("Cannot add an unsaved object to a relation")]
    UnsavedRelatedEntity,

    /// No document matched the query
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Field name missing from the entity's field table
    #[error("Unknown field {field} on {model}")]
    UnknownField {
        /// Entity type name
        model: &'static str,
        /// Logical field name that was requested
        field: String,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage layer errors, passed through unmodified
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Prometheus metrics errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-specific errors raised by a document backend or session
#[derive(Error, Debug)]
pub enum StorageError {
    /// Connection could not be established or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Work attempted on a session that was already released
    #[error("Session already closed")]
    SessionClosed,

    /// No more sessions can be checked out
    #[error("Session limit reached ({max} open)")]
    SessionLimit {
        /// Configured maximum number of concurrent sessions
        max: usize,
    },

    /// Unique key constraint violated
    #[error("Duplicate key {id} in collection {collection}")]
    DuplicateKey {
        /// Collection the insert targeted
        collection: String,
        /// Conflicting `_id`
        id: String,
    },

    /// Filter document could not be evaluated
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Update document could not be applied
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
}

impl Error {
    /// Create an access denied error
    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for the permission failure kinds a caller may want to map to "forbidden"
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }
}

impl StorageError {
    /// Create an invalid filter error
    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    /// Create an invalid update error
    pub fn invalid_update(msg: impl Into<String>) -> Self {
        Self::InvalidUpdate(msg.into())
    }
}
