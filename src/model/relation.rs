//! Many-to-many relations stored as join records
//!
//! A [`Relation`] belongs to an owner entity and records pending add/remove
//! intents. Nothing is read from the join collection until the DataStore
//! turns the intents into inserts and a delete filter.

use crate::core::types::ID_FIELD;
use crate::core::{Document, Result};
use crate::datastore::RelationalDataStore;
use crate::model::{BaseModel, Entity, Model};
use crate::security::Acl;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Join collection name for a relation field of an owner collection
pub fn join_collection_name(relation: &str, owner_collection: &str) -> String {
    format!("_Join:{}:{}", relation, owner_collection)
}

/// One edge of a many-to-many relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRecord {
    /// Join record id
    #[serde(rename = "_id")]
    pub id: String,
    /// Id of the related document
    #[serde(rename = "relatedId")]
    pub related_id: String,
    /// Id of the owning document
    #[serde(rename = "owningId")]
    pub owning_id: String,
}

impl JoinRecord {
    /// Stored form of the edge
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(ID_FIELD.to_string(), Value::from(self.id.as_str()));
        doc.insert("relatedId".to_string(), Value::from(self.related_id.as_str()));
        doc.insert("owningId".to_string(), Value::from(self.owning_id.as_str()));
        doc
    }
}

/// Snapshot of an entity's identity and permissions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordRef {
    /// Collection of the entity
    pub collection: String,
    /// Id of the entity; empty if not yet persisted
    pub id: String,
    /// Permission set at snapshot time
    pub acl: Acl,
}

impl RecordRef {
    /// Snapshot an entity
    pub fn of(entity: &dyn Entity) -> Self {
        Self::from_base(entity.collection(), entity.meta())
    }

    fn from_base(collection: &str, base: &BaseModel) -> Self {
        Self {
            collection: collection.to_string(),
            id: base.id().to_string(),
            acl: base.acl().clone(),
        }
    }

    /// True once the entity carries an id
    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Pending membership changes of one owner's relation
#[derive(Debug, Clone, Default)]
pub struct Relation {
    join_collection: String,
    related_collection: String,
    owner: RecordRef,
    intents: Vec<(RecordRef, bool)>,
}

impl Relation {
    /// Relation `name` from `owner` to documents of `related_collection`
    pub fn new(name: &str, owner: &dyn Entity, related_collection: &str) -> Self {
        let mut relation = Self::default();
        relation.attach(name, owner.collection(), owner.meta(), related_collection);
        relation
    }

    /// Rebind names and the owner snapshot, keeping pending intents
    ///
    /// Owner types call this from their post-load hook and before handing
    /// the relation out, so the owner id and ACL are current.
    pub fn attach(&mut self, name: &str, owner_collection: &str, owner: &BaseModel, related_collection: &str) {
        self.join_collection = join_collection_name(name, owner_collection);
        self.related_collection = related_collection.to_string();
        self.owner = RecordRef::from_base(owner_collection, owner);
    }

    /// Join collection holding the edges
    pub fn join_collection(&self) -> &str {
        &self.join_collection
    }

    /// Collection of the related documents
    pub fn related_collection(&self) -> &str {
        &self.related_collection
    }

    /// Owner snapshot
    pub fn owner(&self) -> &RecordRef {
        &self.owner
    }

    /// Record intent to link `entity`
    pub fn add(&mut self, entity: &dyn Entity) {
        self.record(RecordRef::of(entity), true);
    }

    /// Record intent to unlink `entity`
    pub fn remove(&mut self, entity: &dyn Entity) {
        self.record(RecordRef::of(entity), false);
    }

    /// Entities whose last intent is insert
    pub fn inserting(&self) -> Vec<&RecordRef> {
        self.pending(true)
    }

    /// Entities whose last intent is remove
    pub fn removing(&self) -> Vec<&RecordRef> {
        self.pending(false)
    }

    /// True when intents are waiting to be saved
    pub fn has_pending(&self) -> bool {
        !self.intents.is_empty()
    }

    /// Forget all intents, after they were saved
    pub fn clear_pending(&mut self) {
        self.intents.clear();
    }

    /// Load every related document
    pub async fn find<R, D>(&self, ds: &D) -> Result<Vec<R>>
    where
        R: Model,
        D: RelationalDataStore,
    {
        let mut related = Vec::new();
        ds.find_related_objects(self, &[], |model: R| {
            related.push(model);
            Ok(())
        })
        .await?;
        Ok(related)
    }

    // Unsaved entities have no identity to compare, so each is kept as its own intent
    fn record(&mut self, target: RecordRef, insert: bool) {
        if target.is_persisted() {
            if let Some(entry) = self.intents.iter_mut().find(|(r, _)| r.id == target.id) {
                *entry = (target, insert);
                return;
            }
        }
        self.intents.push((target, insert));
    }

    fn pending(&self, insert: bool) -> Vec<&RecordRef> {
        self.intents
            .iter()
            .filter(|(_, intent)| *intent == insert)
            .map(|(r, _)| r)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Role, User};

    #[test]
    fn test_join_collection_name() {
        assert_eq!(join_collection_name("users", "_Role"), "_Join:users:_Role");
    }

    #[test]
    fn test_last_intent_wins() {
        let owner = Role::with_id("r1");
        let mut relation = Relation::new("users", &owner, "_User");

        let x = User::with_id("x");
        let y = User::with_id("y");
        relation.add(&x);
        relation.add(&y);
        relation.remove(&x);

        let inserting: Vec<&str> = relation.inserting().iter().map(|r| r.id.as_str()).collect();
        let removing: Vec<&str> = relation.removing().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(inserting, vec!["y"]);
        assert_eq!(removing, vec!["x"]);

        relation.add(&x);
        assert_eq!(relation.inserting().len(), 2);
        assert!(relation.removing().is_empty());
    }

    #[test]
    fn test_unsaved_entities_are_tracked_individually() {
        let owner = Role::with_id("r1");
        let mut relation = Relation::new("users", &owner, "_User");

        relation.add(&User::default());
        relation.add(&User::default());
        assert_eq!(relation.inserting().len(), 2);

        relation.clear_pending();
        assert!(!relation.has_pending());
    }

    #[test]
    fn test_join_record_wire_format() {
        let record = JoinRecord {
            id: "j1".into(),
            related_id: "u1".into(),
            owning_id: "r1".into(),
        };
        let expected = serde_json::json!({"_id": "j1", "relatedId": "u1", "owningId": "r1"});
        assert_eq!(serde_json::to_value(&record).unwrap(), expected);
        assert_eq!(Value::Object(record.to_document()), expected);
    }
}
