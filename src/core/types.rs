//! Shared type definitions for rowguard
//!
//! Documents travel between the query builders and the storage backend as
//! JSON object maps. The reserved field names below form the storage wire
//! format every collection shares.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// A stored document, a filter, or an update: all are JSON object maps
pub type Document = Map<String, Value>;

/// Creation and modification timestamps
pub type Timestamp = DateTime<Utc>;

/// Document identity field
pub const ID_FIELD: &str = "_id";
/// Creation timestamp field
pub const CREATED_AT_FIELD: &str = "_created_at";
/// Last modification timestamp field
pub const UPDATED_AT_FIELD: &str = "_updated_at";
/// Permission map field
pub const ACL_FIELD: &str = "_acl";
/// Subject keys granted read access
pub const READ_PERM_FIELD: &str = "_rperm";
/// Subject keys granted write access
pub const WRITE_PERM_FIELD: &str = "_wperm";
/// Owner pointer field used by user-owned collections
pub const OWNER_POINTER_FIELD: &str = "_p_user";

/// Source of unique ids for new documents
pub trait IdSource: Send + Sync + std::fmt::Debug {
    /// Produce a fresh id
    fn next_id(&self) -> String;
}

/// Generates 24 hex character ids, the width of a 12-byte object id
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectIdSource;

impl IdSource for ObjectIdSource {
    fn next_id(&self) -> String {
        let uuid = uuid::Uuid::new_v4();
        hex::encode(&uuid.as_bytes()[..12])
    }
}

/// Current time, truncated to millisecond precision so values survive a
/// storage round trip unchanged
pub fn now() -> Timestamp {
    let now = Utc::now();
    DateTime::<Utc>::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Stored form of a timestamp: fixed-width RFC 3339 with milliseconds, so
/// string order matches time order
pub fn timestamp_value(t: &Timestamp) -> Value {
    Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Serde adapter writing optional timestamps in the stored form
pub mod timestamp_format {
    use super::Timestamp;
    use chrono::SecondsFormat;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize an optional timestamp
    pub fn serialize<S: Serializer>(value: &Option<Timestamp>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => s.serialize_none(),
        }
    }

    /// Deserialize an optional timestamp from any RFC 3339 string
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Timestamp>, D::Error> {
        Option::<Timestamp>::deserialize(d)
    }
}
