//! Query construction strategies
//!
//! A [`QueryBuilder`] turns each abstract data-access intent into the
//! concrete filter and update documents the backend executes. The DataStore
//! never builds a filter itself, so swapping the builder is enough to switch
//! access control on or off:
//!
//! - [`UnrestrictedQueryBuilder`] adds no conditions.
//! - [`RestrictedQueryBuilder`] wraps another builder and enforces the
//!   caller's read and write permissions.

pub mod filter;
pub mod restricted;
pub mod unrestricted;

pub use restricted::RestrictedQueryBuilder;
pub use unrestricted::UnrestrictedQueryBuilder;

pub use crate::storage::Change;

use crate::core::{Document, IdSource, Result, Timestamp};
use crate::model::{Entity, JoinRecord, RecordRef, Relation};

/// Join maintenance derived from a relation's pending intents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationUpdate {
    /// Join records to insert
    pub inserts: Vec<JoinRecord>,
    /// Filter matching the join records to delete, if any
    pub delete_filter: Option<Document>,
}

/// Strategy translating data-access intents into filters and updates
pub trait QueryBuilder: Send + Sync + std::fmt::Debug {
    /// Filter for counting documents
    fn make_count_query(&self, collection: &str, query: Document) -> Document;

    /// Filter for finding documents
    fn make_find_query(&self, collection: &str, query: Document) -> Document;

    /// Filter selecting one entity by id; `MissingIdentity` if it has none
    fn make_find_by_id_query(&self, entity: &dyn Entity) -> Result<Document>;

    /// Filter removing one entity by id; `MissingIdentity` if it has none
    fn make_remove_query(&self, entity: &dyn Entity) -> Result<Document>;

    /// Filter for a bulk remove
    fn make_remove_all_query(&self, collection: &str, query: Document) -> Result<Document>;

    /// Stamp id and timestamps onto the entity and return it as a document
    fn make_insert_document(&self, entity: &mut dyn Entity, now: Timestamp, id: &str) -> Result<Document>;

    /// Filter and atomic update applying the entity's pending changes
    fn make_change_document(&self, entity: &dyn Entity, now: Timestamp) -> Result<(Document, Change)>;

    /// Filter and upsert for the entity's pending changes
    fn make_upsert_document(
        &self,
        entity: &dyn Entity,
        query: Document,
        now: Timestamp,
        id: &str,
    ) -> Result<(Document, Change)>;

    /// Join filter on related ids
    fn query_by_related_models(&self, join_collection: &str, related: &[RecordRef]) -> Document;

    /// Join filter on owning ids
    fn query_by_owning_models(&self, join_collection: &str, owning: &[RecordRef]) -> Document;

    /// Filter on a set of document ids
    fn query_by_ids(&self, collection: &str, ids: &[String]) -> Document;

    /// Join records to insert and the filter of join records to delete
    fn make_relation_update_documents(&self, relation: &Relation, ids: &dyn IdSource) -> Result<RelationUpdate>;
}
