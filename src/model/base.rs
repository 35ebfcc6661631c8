//! State shared by every entity: identity, timestamps, ACL, change tracking

use crate::core::types::{
    timestamp_format, timestamp_value, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};
use crate::core::{Document, Timestamp};
use crate::model::changes::ChangeSet;
use crate::security::Acl;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity, timestamps, permissions and pending changes of one entity
///
/// Entity types embed this with `#[serde(flatten)]`. Only `_id`, the two
/// timestamps and the ACL fields are persisted; `is_new` and the change set
/// live in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseModel {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    id: String,

    #[serde(
        rename = "_created_at",
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp_format"
    )]
    created_at: Option<Timestamp>,

    #[serde(
        rename = "_updated_at",
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp_format"
    )]
    updated_at: Option<Timestamp>,

    #[serde(flatten)]
    acl: Acl,

    #[serde(skip)]
    is_new: bool,

    #[serde(skip)]
    changes: ChangeSet,
}

impl BaseModel {
    /// Base state for an entity that already exists under `id`
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Document id; empty until persisted
    pub fn id(&self) -> &str {
        &self.id
    }

    /// True once the entity carries an id
    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }

    /// Replace the document id
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Creation time, absent until first persisted
    pub fn created_at(&self) -> Option<Timestamp> {
        self.created_at
    }

    /// Last modification time, absent until first persisted
    pub fn updated_at(&self) -> Option<Timestamp> {
        self.updated_at
    }

    /// Set the creation time
    pub fn set_created_at(&mut self, t: Timestamp) {
        self.created_at = Some(t);
    }

    /// Set the modification time
    pub fn set_updated_at(&mut self, t: Timestamp) {
        self.updated_at = Some(t);
    }

    /// Whether the last persistence call created the document
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Set by the DataStore after each persistence call
    pub fn set_is_new(&mut self, is_new: bool) {
        self.is_new = is_new;
    }

    /// Permission set of this entity
    pub fn acl(&self) -> &Acl {
        &self.acl
    }

    /// Replace the permission set and record the change for the next save
    pub fn set_acl(&mut self, acl: Acl) {
        for (key, value) in acl.to_set_fields() {
            self.changes.set(&key, value);
        }
        self.acl = acl;
    }

    /// Pending changes
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Mutable access to the pending changes
    pub fn changes_mut(&mut self) -> &mut ChangeSet {
        &mut self.changes
    }

    /// Forget pending changes, after they were persisted
    pub fn clear_changes(&mut self) {
        self.changes.clear();
    }

    /// Drop identity and timestamps after a failed insert
    pub(crate) fn clear_identity(&mut self) {
        self.id.clear();
        self.created_at = None;
        self.updated_at = None;
    }

    /// Update document for an existing record: pending changes plus
    /// `$set._updated_at = now`
    pub fn update(&self, now: Timestamp) -> Document {
        let mut changes = self.changes.clone();
        changes.set(UPDATED_AT_FIELD, timestamp_value(&now));
        changes.to_update_document()
    }

    /// Update document for an upsert: pending changes plus `$setOnInsert`
    /// of the new id and both timestamps
    pub fn upsert(&self, now: Timestamp, id: &str) -> Document {
        let mut changes = self.changes.clone();
        changes.set_on_insert(ID_FIELD, Value::from(id));
        changes.set_on_insert(CREATED_AT_FIELD, timestamp_value(&now));
        changes.set_on_insert(UPDATED_AT_FIELD, timestamp_value(&now));
        changes.to_update_document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::now;
    use crate::model::changes::UpdateOperator;
    use serde_json::json;

    #[test]
    fn test_update_stamps_updated_at_without_consuming_changes() {
        let mut base = BaseModel::with_id("a1");
        base.changes_mut().set("name", json!("x"));
        let t = now();

        let update = base.update(t);
        assert_eq!(update["$set"]["name"], json!("x"));
        assert_eq!(update["$set"][UPDATED_AT_FIELD], timestamp_value(&t));
        assert!(base.changes().get(UpdateOperator::Set).is_some());
        assert!(base.changes().get(UpdateOperator::Set).unwrap().get(UPDATED_AT_FIELD).is_none());
    }

    #[test]
    fn test_upsert_sets_identity_on_insert_only() {
        let mut base = BaseModel::default();
        base.changes_mut().set("name", json!("admin"));
        let t = now();

        let update = base.upsert(t, "new-id");
        assert_eq!(update["$setOnInsert"][ID_FIELD], json!("new-id"));
        assert_eq!(update["$setOnInsert"][CREATED_AT_FIELD], timestamp_value(&t));
        assert_eq!(update["$set"], json!({"name": "admin"}));
    }

    #[test]
    fn test_set_acl_records_all_permission_fields() {
        let mut acl = Acl::new();
        acl.add_read("u1");

        let mut base = BaseModel::with_id("a1");
        base.set_acl(acl);

        let update = base.update(now());
        assert_eq!(update["$set"]["_acl"], json!({"u1": {"r": true, "w": false}}));
        assert_eq!(update["$set"]["_rperm"], json!(["u1"]));
        assert_eq!(update["$set"]["_wperm"], json!([]));
        assert!(base.acl().can_read("u1"));
    }

    #[test]
    fn test_serialized_form() {
        let mut base = BaseModel::with_id("a1");
        base.set_is_new(true);
        base.changes_mut().set("x", json!(1));

        let value = serde_json::to_value(&base).unwrap();
        assert_eq!(value, json!({"_id": "a1"}));

        let empty = serde_json::to_value(BaseModel::default()).unwrap();
        assert_eq!(empty, json!({}));
    }
}
