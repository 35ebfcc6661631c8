//! Access-control enforcing query builder
//!
//! Wraps another builder and folds the caller's permissions into every
//! filter it produces:
//!
//! - Reads require `_rperm` to be absent or to intersect the caller's access
//!   set. A caller reading its own user record skips the check.
//! - Writes first pass an in-memory check against the entity's ACL, then get
//!   a `_wperm` clause so the storage layer re-checks at execution time.
//! - Bulk removes are refused on users and roles, and elsewhere must be
//!   scoped to documents owned by the caller.

use crate::core::types::{ID_FIELD, OWNER_POINTER_FIELD, READ_PERM_FIELD, WRITE_PERM_FIELD};
use crate::core::{Document, Error, IdSource, Result, Timestamp};
use crate::entities::{Role, User};
use crate::model::{pointer_string, Entity, Model, RecordRef, Relation};
use crate::query::filter::add_clause;
use crate::query::{Change, QueryBuilder, RelationUpdate, UnrestrictedQueryBuilder};
use crate::security::{Acl, CallerIdentity};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Decorator enforcing one caller's permissions on an inner builder
#[derive(Debug, Clone)]
pub struct RestrictedQueryBuilder<Q = UnrestrictedQueryBuilder> {
    caller: CallerIdentity,
    inner: Q,
    access: Vec<String>,
}

impl RestrictedQueryBuilder {
    /// Restrict the unrestricted builder to `caller`
    pub fn new(caller: CallerIdentity) -> Self {
        Self::wrap(caller, UnrestrictedQueryBuilder::new())
    }
}

impl<Q: QueryBuilder> RestrictedQueryBuilder<Q> {
    /// Restrict an arbitrary builder to `caller`
    pub fn wrap(caller: CallerIdentity, inner: Q) -> Self {
        let access = caller.access_set();
        Self {
            caller,
            inner,
            access,
        }
    }

    /// Caller the builder enforces permissions for
    pub fn caller(&self) -> &CallerIdentity {
        &self.caller
    }

    /// Subject keys the caller matches
    pub fn access(&self) -> &[String] {
        &self.access
    }

    fn is_self(&self, collection: &str, id: &str) -> bool {
        collection == User::COLLECTION && !id.is_empty() && id == self.caller.subject
    }

    fn add_read_check(&self, query: &mut Document) {
        add_clause(
            query,
            "$or",
            json!([
                { READ_PERM_FIELD: { "$exists": false } },
                { READ_PERM_FIELD: { "$in": self.access } },
            ]),
        );
    }

    fn add_write_check(&self, query: &mut Document) {
        add_clause(query, WRITE_PERM_FIELD, json!({ "$in": self.access }));
    }

    fn deny(&self, operation: &str, reason: &str) -> Error {
        warn!(
            subject = %self.caller.subject,
            operation,
            reason,
            "Access denied"
        );
        Error::access_denied(reason.to_string())
    }

    /// Passes for unsaved entities and the caller's own user record;
    /// otherwise the ACL must grant the caller write
    fn check_write(&self, operation: &str, collection: &str, id: &str, acl: &Acl) -> Result<()> {
        if id.is_empty() || self.is_self(collection, id) {
            return Ok(());
        }

        if !acl.can_write(&self.caller.subject) {
            return Err(self.deny(
                operation,
                "You don't have permission to carry out this operation",
            ));
        }
        Ok(())
    }

    fn check_entity_write(&self, operation: &str, entity: &dyn Entity) -> Result<()> {
        let meta = entity.meta();
        self.check_write(operation, entity.collection(), meta.id(), meta.acl())
    }
}

impl<Q: QueryBuilder> QueryBuilder for RestrictedQueryBuilder<Q> {
    fn make_count_query(&self, collection: &str, query: Document) -> Document {
        let mut result = self.inner.make_count_query(collection, query);
        self.add_read_check(&mut result);
        result
    }

    fn make_find_query(&self, collection: &str, query: Document) -> Document {
        let own_record = query
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .is_some_and(|id| self.is_self(collection, id));

        let mut result = self.inner.make_find_query(collection, query);
        if !own_record {
            self.add_read_check(&mut result);
        }
        result
    }

    fn make_find_by_id_query(&self, entity: &dyn Entity) -> Result<Document> {
        let mut result = self.inner.make_find_by_id_query(entity)?;
        if !self.is_self(entity.collection(), entity.meta().id()) {
            self.add_read_check(&mut result);
        }
        Ok(result)
    }

    fn make_remove_query(&self, entity: &dyn Entity) -> Result<Document> {
        self.check_entity_write("remove", entity)?;

        let mut result = self.inner.make_remove_query(entity)?;
        if !self.is_self(entity.collection(), entity.meta().id()) {
            self.add_write_check(&mut result);
        }
        Ok(result)
    }

    fn make_remove_all_query(&self, collection: &str, query: Document) -> Result<Document> {
        if collection == User::COLLECTION || collection == Role::COLLECTION {
            return Err(self.deny("remove_all", "Bulk removal is not allowed on this collection"));
        }

        let owner = pointer_string(User::COLLECTION, &self.caller.subject);
        let scoped = query
            .get(OWNER_POINTER_FIELD)
            .and_then(Value::as_str)
            .is_some_and(|p| p == owner);
        if !scoped {
            return Err(self.deny("remove_all", "Cannot remove objects that are not yours"));
        }

        let mut result = self.inner.make_remove_all_query(collection, query)?;
        self.add_write_check(&mut result);
        Ok(result)
    }

    fn make_insert_document(&self, entity: &mut dyn Entity, now: Timestamp, id: &str) -> Result<Document> {
        self.inner.make_insert_document(entity, now, id)
    }

    fn make_change_document(&self, entity: &dyn Entity, now: Timestamp) -> Result<(Document, Change)> {
        self.check_entity_write("update", entity)?;

        let (mut query, change) = self.inner.make_change_document(entity, now)?;
        if !self.is_self(entity.collection(), entity.meta().id()) {
            self.add_write_check(&mut query);
        }
        debug!(query = ?query, "Restricted change document");
        Ok((query, change))
    }

    fn make_upsert_document(
        &self,
        entity: &dyn Entity,
        query: Document,
        now: Timestamp,
        id: &str,
    ) -> Result<(Document, Change)> {
        self.check_entity_write("upsert", entity)?;

        let (mut query, change) = self.inner.make_upsert_document(entity, query, now, id)?;
        self.add_write_check(&mut query);
        Ok((query, change))
    }

    fn query_by_related_models(&self, join_collection: &str, related: &[RecordRef]) -> Document {
        self.inner.query_by_related_models(join_collection, related)
    }

    fn query_by_owning_models(&self, join_collection: &str, owning: &[RecordRef]) -> Document {
        self.inner.query_by_owning_models(join_collection, owning)
    }

    fn query_by_ids(&self, collection: &str, ids: &[String]) -> Document {
        let mut result = self.inner.query_by_ids(collection, ids);
        self.add_read_check(&mut result);
        result
    }

    fn make_relation_update_documents(&self, relation: &Relation, ids: &dyn IdSource) -> Result<RelationUpdate> {
        let owner = relation.owner();
        self.check_write("save_related", &owner.collection, &owner.id, &owner.acl)?;
        self.inner.make_relation_update_documents(relation, ids)
    }
}
