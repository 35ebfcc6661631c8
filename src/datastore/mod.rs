//! Persistence API over a query builder and a storage session
//!
//! [`DataStore`] is the single entry point entities persist through. It
//! obtains every filter and update from its [`QueryBuilder`] and executes
//! them on the session's backend, so the same code path serves privileged
//! and caller-restricted access.

pub mod store;

pub use store::Store;

use crate::core::{Document, Result};
use crate::model::{Entity, Model, Relation};
use crate::query::QueryBuilder;
use async_trait::async_trait;
use std::sync::Arc;

/// Operations on many-to-many relations
#[async_trait]
pub trait RelationalDataStore: Send + Sync {
    /// Stream every document linked from the relation's owner
    async fn find_related_objects<M, F>(&self, relation: &Relation, sort: &[&str], f: F) -> Result<()>
    where
        M: Model,
        F: FnMut(M) -> Result<()> + Send;

    /// Stream every owner whose `join_collection` links to `related`
    async fn find_owning_objects<M, F>(&self, join_collection: &str, related: &dyn Entity, f: F) -> Result<()>
    where
        M: Model,
        F: FnMut(M) -> Result<()> + Send;

    /// Apply the relation's pending intents to its join collection
    async fn save_related_objects(&self, relation: &mut Relation) -> Result<()>;
}

/// Entity persistence bound to one session
#[async_trait]
pub trait DataStore: RelationalDataStore {
    /// Replace the query builder used by subsequent operations
    fn set_query_builder(&mut self, builder: Arc<dyn QueryBuilder>);

    /// Release the session; later operations fail
    fn close(&mut self);

    /// Reload an entity by its id
    async fn fetch(&self, entity: &mut dyn Entity) -> Result<()>;

    /// Load the first document matching `query` into `entity`
    async fn find_object(&self, collection: &str, query: Document, entity: &mut dyn Entity) -> Result<()>;

    /// Stream the documents matching `query`, in `sort` order
    async fn find_each<M, F>(&self, collection: &str, query: Document, sort: &[&str], f: F) -> Result<()>
    where
        M: Model,
        F: FnMut(M) -> Result<()> + Send;

    /// Insert an unsaved entity, assigning its id and timestamps
    async fn insert_object(&self, entity: &mut dyn Entity) -> Result<()>;

    /// Insert several unsaved entities of one collection in a single write
    async fn insert_all(&self, collection: &str, entities: &mut [&mut dyn Entity]) -> Result<()>;

    /// Apply the entity's pending changes atomically and reload it
    async fn update_object(&self, entity: &mut dyn Entity) -> Result<()>;

    /// Update the document matching `query`, creating it when absent
    async fn upsert_object(&self, entity: &mut dyn Entity, query: Document) -> Result<()>;

    /// Remove an entity by id
    async fn remove_object(&self, entity: &dyn Entity) -> Result<()>;

    /// Remove every document matching `query`, returning how many
    async fn remove_all(&self, collection: &str, query: Document) -> Result<u64>;

    /// Count the documents matching `query`
    async fn count(&self, collection: &str, query: Document) -> Result<u64>;
}
