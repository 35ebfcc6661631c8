//! Per-document permission sets
//!
//! An [`Acl`] maps subject keys (a user id, `role:<name>` or the public
//! wildcard `*`) to read/write grants. The granted keys are also kept in two
//! flat lists, `_rperm` and `_wperm`, so the storage layer can filter on them
//! directly.

use crate::core::types::{ACL_FIELD, READ_PERM_FIELD, WRITE_PERM_FIELD};
use crate::core::Document;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Subject key matching every caller
pub const PUBLIC_KEY: &str = "*";

/// Prefix of role subject keys
pub const ROLE_PREFIX: &str = "role:";

/// Subject key for a named role
pub fn role_key(name: &str) -> String {
    format!("{}{}", ROLE_PREFIX, name)
}

/// Read/write grant for a single subject
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Subject may read the document
    #[serde(rename = "r", default)]
    pub read: bool,
    /// Subject may modify the document
    #[serde(rename = "w", default)]
    pub write: bool,
}

/// Permission set embedded in every entity
///
/// A document without `_rperm` is readable by every caller. An empty set
/// therefore stores nothing, while any set with grants always stores
/// `_rperm`, even as `[]` when no subject may read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Acl {
    #[serde(rename = "_acl", default)]
    entries: BTreeMap<String, Permission>,

    #[serde(rename = "_rperm", default)]
    read_access: Vec<String>,

    #[serde(rename = "_wperm", default)]
    write_access: Vec<String>,
}

impl Serialize for Acl {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.entries.is_empty() {
            map.serialize_entry(ACL_FIELD, &self.entries)?;
        }
        if !self.entries.is_empty() || !self.read_access.is_empty() {
            map.serialize_entry(READ_PERM_FIELD, &self.read_access)?;
        }
        if !self.write_access.is_empty() {
            map.serialize_entry(WRITE_PERM_FIELD, &self.write_access)?;
        }
        map.end()
    }
}

impl Acl {
    /// Create an empty permission set
    pub fn new() -> Self {
        Self::default()
    }

    /// Permission set granting public read and write
    pub fn public_read_write() -> Self {
        let mut acl = Self::new();
        acl.set_public_read_write();
        acl
    }

    /// Grant read to a subject
    pub fn add_read(&mut self, subject: impl Into<String>) {
        let subject = subject.into();
        self.entries.entry(subject.clone()).or_default().read = true;
        if !self.read_access.contains(&subject) {
            self.read_access.push(subject);
        }
    }

    /// Grant write to a subject
    pub fn add_write(&mut self, subject: impl Into<String>) {
        let subject = subject.into();
        self.entries.entry(subject.clone()).or_default().write = true;
        if !self.write_access.contains(&subject) {
            self.write_access.push(subject);
        }
    }

    /// Grant read to everyone
    pub fn set_public_read(&mut self) {
        self.add_read(PUBLIC_KEY);
    }

    /// Grant write to everyone
    pub fn set_public_write(&mut self) {
        self.add_write(PUBLIC_KEY);
    }

    /// Grant read and write to everyone
    pub fn set_public_read_write(&mut self) {
        self.set_public_read();
        self.set_public_write();
    }

    /// True if the subject, or the public wildcard, may read
    pub fn can_read(&self, subject: &str) -> bool {
        self.grant(subject).read || self.grant(PUBLIC_KEY).read
    }

    /// True if the subject, or the public wildcard, may write
    pub fn can_write(&self, subject: &str) -> bool {
        self.grant(subject).write || self.grant(PUBLIC_KEY).write
    }

    /// True when no grants exist
    pub fn is_zero(&self) -> bool {
        self.entries.is_empty() && self.read_access.is_empty() && self.write_access.is_empty()
    }

    /// Subjects granted read, in grant order
    pub fn read_access(&self) -> &[String] {
        &self.read_access
    }

    /// Subjects granted write, in grant order
    pub fn write_access(&self) -> &[String] {
        &self.write_access
    }

    /// Grant for a single subject (default: nothing)
    pub fn grant(&self, subject: &str) -> Permission {
        self.entries.get(subject).copied().unwrap_or_default()
    }

    /// The three stored fields as a `$set` payload
    pub(crate) fn to_set_fields(&self) -> Document {
        let entries: Document = self
            .entries
            .iter()
            .map(|(subject, p)| {
                (
                    subject.clone(),
                    serde_json::json!({ "r": p.read, "w": p.write }),
                )
            })
            .collect();

        let mut fields = Document::new();
        fields.insert(ACL_FIELD.to_string(), Value::Object(entries));
        fields.insert(
            READ_PERM_FIELD.to_string(),
            Value::from(self.read_access.clone()),
        );
        fields.insert(
            WRITE_PERM_FIELD.to_string(),
            Value::from(self.write_access.clone()),
        );
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_acl_is_zero() {
        let acl = Acl::new();
        assert!(acl.is_zero());
        assert!(!acl.can_read("anyone"));
        assert!(!acl.can_write("anyone"));
    }

    #[test]
    fn test_repeated_grants_are_deduplicated() {
        let mut acl = Acl::new();
        acl.add_read("u1");
        acl.add_read("u1");
        acl.add_write("u1");
        acl.add_write("u1");

        assert_eq!(acl.read_access(), ["u1".to_string()]);
        assert_eq!(acl.write_access(), ["u1".to_string()]);
        assert_eq!(acl.grant("u1"), Permission { read: true, write: true });
    }

    #[test]
    fn test_wire_format() {
        let mut acl = Acl::new();
        acl.add_read("u1");
        acl.add_write(role_key("admin"));

        let value = serde_json::to_value(&acl).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "_acl": {
                    "u1": {"r": true, "w": false},
                    "role:admin": {"r": false, "w": true}
                },
                "_rperm": ["u1"],
                "_wperm": ["role:admin"]
            })
        );

        let empty = serde_json::to_value(Acl::new()).unwrap();
        assert_eq!(empty, serde_json::json!({}));

        let back: Acl = serde_json::from_value(value).unwrap();
        assert_eq!(back, acl);
    }

    #[test]
    fn test_write_only_grant_stores_empty_read_list() {
        let mut acl = Acl::new();
        acl.add_write("u1");

        let value = serde_json::to_value(&acl).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "_acl": {"u1": {"r": false, "w": true}},
                "_rperm": [],
                "_wperm": ["u1"]
            })
        );
        assert!(!acl.can_read("u1"));

        let back: Acl = serde_json::from_value(value).unwrap();
        assert_eq!(back, acl);
    }

    #[test]
    fn test_set_fields_always_carries_all_three() {
        let fields = Acl::new().to_set_fields();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[READ_PERM_FIELD], serde_json::json!([]));
    }

    proptest! {
        #[test]
        fn prop_read_grant_is_exact(subject in "[a-z0-9]{1,12}", other in "[a-z0-9]{1,12}") {
            prop_assume!(subject != other);
            let mut acl = Acl::new();
            acl.add_read(subject.clone());

            prop_assert!(acl.can_read(&subject));
            prop_assert!(!acl.can_read(&other));
            prop_assert!(!acl.can_write(&subject));
        }

        #[test]
        fn prop_public_grants_cover_everyone(subject in "\\PC{0,16}") {
            let mut acl = Acl::new();
            acl.set_public_read();
            acl.set_public_write();

            prop_assert!(acl.can_read(&subject));
            prop_assert!(acl.can_write(&subject));
            prop_assert!(!acl.is_zero());
        }
    }
}
