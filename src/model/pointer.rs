//! References to documents in other collections
//!
//! Two encodings exist: the compact owner-pointer string `<collection>$<id>`
//! stored in fields such as `_p_user`, and the pointer document
//! `{"__type": "Pointer", "className": ..., "objectId": ...}` used inside
//! arbitrary values.

use crate::model::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const POINTER_TYPE: &str = "Pointer";

/// Canonical pointer string for a document
pub fn pointer_string(collection: &str, id: &str) -> String {
    format!("{}${}", collection, id)
}

/// Split a pointer string into collection and id
pub fn parse_pointer(pointer: &str) -> Option<(&str, &str)> {
    match pointer.split_once('$') {
        Some((collection, id)) if !collection.is_empty() && !id.is_empty() => Some((collection, id)),
        _ => None,
    }
}

/// Pointer document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pointer {
    #[serde(rename = "__type")]
    type_name: String,
    /// Target collection
    #[serde(rename = "className")]
    pub class_name: String,
    /// Target id
    #[serde(rename = "objectId")]
    pub object_id: String,
}

impl Pointer {
    /// Pointer to a document
    pub fn new(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            type_name: POINTER_TYPE.to_string(),
            class_name: class_name.into(),
            object_id: object_id.into(),
        }
    }

    /// Pointer to a loaded entity
    pub fn to(entity: &dyn Entity) -> Self {
        Self::new(entity.collection(), entity.meta().id())
    }

    /// Recognize a pointer document inside an arbitrary value
    pub fn from_value(value: &Value) -> Option<Self> {
        let pointer: Pointer = serde_json::from_value(value.clone()).ok()?;
        (pointer.type_name == POINTER_TYPE).then_some(pointer)
    }

    /// Encode as a JSON value
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "__type": self.type_name,
            "className": self.class_name,
            "objectId": self.object_id,
        })
    }

    /// Compact string form
    pub fn as_pointer_string(&self) -> String {
        pointer_string(&self.class_name, &self.object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pointer_string_round_trip() {
        let s = pointer_string("_User", "abc123");
        assert_eq!(s, "_User$abc123");
        assert_eq!(parse_pointer(&s), Some(("_User", "abc123")));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_pointer(""), None);
        assert_eq!(parse_pointer("_User"), None);
        assert_eq!(parse_pointer("$abc"), None);
        assert_eq!(parse_pointer("_User$"), None);
    }

    #[test]
    fn test_pointer_document() {
        let value = json!({"__type": "Pointer", "className": "Task", "objectId": "t1"});
        let pointer = Pointer::from_value(&value).unwrap();
        assert_eq!(pointer, Pointer::new("Task", "t1"));
        assert_eq!(pointer.to_value(), value);
        assert_eq!(pointer.as_pointer_string(), "Task$t1");

        assert!(Pointer::from_value(&json!({"__type": "Date", "className": "x", "objectId": "y"})).is_none());
        assert!(Pointer::from_value(&json!("Task$t1")).is_none());
    }
}
