//! Pending field mutations
//!
//! A [`ChangeSet`] accumulates `$set`, `$unset`, `$inc` and `$setOnInsert`
//! clauses keyed by storage field name. The DataStore sends it as one update
//! document, so every clause lands in a single atomic step.

use crate::core::Document;
use serde_json::Value;
use std::collections::BTreeMap;

/// Update operator a pending change belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateOperator {
    /// Overwrite a field
    Set,
    /// Remove a field
    Unset,
    /// Add a delta to a numeric field
    Increment,
    /// Write a field only when the update creates the document
    SetOnInsert,
}

impl UpdateOperator {
    /// Operator key in an update document
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "$set",
            Self::Unset => "$unset",
            Self::Increment => "$inc",
            Self::SetOnInsert => "$setOnInsert",
        }
    }
}

/// Accumulated, not yet persisted mutations of one entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    ops: BTreeMap<UpdateOperator, Document>,
}

impl ChangeSet {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `$set`, dropping any pending `$unset` of the same key
    pub fn set(&mut self, key: &str, value: Value) {
        self.insert(UpdateOperator::Set, key, value);
        self.discard(UpdateOperator::Unset, key);
    }

    /// Record an `$unset`, dropping any pending `$set` of the same key
    pub fn unset(&mut self, key: &str) {
        self.insert(UpdateOperator::Unset, key, Value::String(String::new()));
        self.discard(UpdateOperator::Set, key);
    }

    /// Add `delta` to the pending `$inc` of a key, saturating at the `i64` bounds
    pub fn increment(&mut self, key: &str, delta: i64) {
        let clause = self.ops.entry(UpdateOperator::Increment).or_default();
        let current = clause.get(key).and_then(Value::as_i64).unwrap_or(0);
        clause.insert(key.to_string(), Value::from(current.saturating_add(delta)));
    }

    /// Record a `$setOnInsert`
    pub fn set_on_insert(&mut self, key: &str, value: Value) {
        self.insert(UpdateOperator::SetOnInsert, key, value);
    }

    /// Pending clause for one operator
    pub fn get(&self, op: UpdateOperator) -> Option<&Document> {
        self.ops.get(&op)
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Drop every pending change
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Render as an update document: `{"$set": {...}, "$inc": {...}, ...}`
    pub fn to_update_document(&self) -> Document {
        self.ops
            .iter()
            .map(|(op, fields)| (op.as_str().to_string(), Value::Object(fields.clone())))
            .collect()
    }

    fn insert(&mut self, op: UpdateOperator, key: &str, value: Value) {
        self.ops.entry(op).or_default().insert(key.to_string(), value);
    }

    fn discard(&mut self, op: UpdateOperator, key: &str) {
        if let Some(clause) = self.ops.get_mut(&op) {
            clause.remove(key);
            if clause.is_empty() {
                self.ops.remove(&op);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_then_unset_keeps_only_unset() {
        let mut changes = ChangeSet::new();
        changes.set("name", json!("a"));
        changes.unset("name");

        assert_eq!(
            Value::Object(changes.to_update_document()),
            json!({"$unset": {"name": ""}})
        );
    }

    #[test]
    fn test_unset_then_set_keeps_only_set() {
        let mut changes = ChangeSet::new();
        changes.unset("name");
        changes.set("name", json!("b"));

        assert_eq!(
            Value::Object(changes.to_update_document()),
            json!({"$set": {"name": "b"}})
        );
    }

    #[test]
    fn test_increments_saturate() {
        let mut changes = ChangeSet::new();
        changes.increment("n", i64::MAX);
        changes.increment("n", 1);
        changes.increment("m", i64::MIN);
        changes.increment("m", -5);

        assert_eq!(
            Value::Object(changes.to_update_document()),
            json!({"$inc": {"n": i64::MAX, "m": i64::MIN}})
        );
    }

    #[test]
    fn test_increments_accumulate() {
        let mut changes = ChangeSet::new();
        changes.increment("taskClaimed", 1);
        changes.increment("taskClaimed", 2);
        changes.set("taskStatus", json!("CLAIMED"));

        assert_eq!(
            Value::Object(changes.to_update_document()),
            json!({"$inc": {"taskClaimed": 3}, "$set": {"taskStatus": "CLAIMED"}})
        );
    }

    #[test]
    fn test_clear() {
        let mut changes = ChangeSet::new();
        changes.set_on_insert("_id", json!("x"));
        assert!(!changes.is_empty());

        changes.clear();
        assert!(changes.is_empty());
        assert!(changes.to_update_document().is_empty());
    }
}
