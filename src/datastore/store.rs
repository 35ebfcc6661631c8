//! DataStore executing builder output on a storage session

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::types::now;
use crate::core::{Document, Error, IdSource, Result};
use crate::datastore::{DataStore, RelationalDataStore};
use crate::model::{Entity, JoinRecord, Model, RecordRef, Relation};
use crate::query::QueryBuilder;
use crate::storage::factory::SharedBackend;
use crate::storage::{FindOptions, Session};
use crate::system::metrics::{self, Timer};

/// DataStore bound to one session and one query builder
#[derive(Debug)]
pub struct Store {
    session: Session,
    builder: Arc<dyn QueryBuilder>,
    ids: Arc<dyn IdSource>,
}

impl Store {
    /// Create a store over a checked-out session
    pub fn new(
        session: Session,
        builder: Arc<dyn QueryBuilder>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        Self {
            session,
            builder,
            ids,
        }
    }

    /// Query builder currently in effect
    pub fn builder(&self) -> &Arc<dyn QueryBuilder> {
        &self.builder
    }

    /// True until the session is closed
    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    fn backend(&self) -> Result<&SharedBackend> {
        Ok(self.session.backend()?)
    }

    async fn load_by_id(&self, entity: &mut dyn Entity) -> Result<()> {
        let filter = self.builder.make_find_by_id_query(&*entity)?;
        debug!(filter = ?filter, "Find by id");

        let collection = entity.collection();
        let doc = self
            .backend()?
            .find_one(collection, filter)
            .await?
            .ok_or_else(|| not_found(collection, entity.meta().id()))?;

        entity.load_document(doc)?;
        entity.meta_mut().set_is_new(false);
        Ok(())
    }

    async fn load_first(&self, collection: &str, query: Document, entity: &mut dyn Entity) -> Result<()> {
        let filter = self.builder.make_find_query(collection, query);
        debug!(filter = ?filter, "Find first");

        let doc = self
            .backend()?
            .find_one(collection, filter)
            .await?
            .ok_or_else(|| Error::not_found(format!("no {} matched the query", collection)))?;

        entity.load_document(doc)?;
        entity.meta_mut().set_is_new(false);
        Ok(())
    }

    async fn insert_one(&self, entity: &mut dyn Entity) -> Result<()> {
        if entity.meta().is_persisted() {
            return Err(Error::AlreadyExists(entity.meta().id().to_string()));
        }

        let collection = entity.collection();
        let id = self.ids.next_id();
        let inserted = async {
            let doc = self.builder.make_insert_document(&mut *entity, now(), &id)?;
            self.backend()?.insert_many(collection, vec![doc]).await?;
            Ok::<(), Error>(())
        }
        .await;

        match inserted {
            Ok(()) => {
                mark_inserted(entity);
                Ok(())
            }
            Err(err) => {
                entity.meta_mut().clear_identity();
                Err(err)
            }
        }
    }

    async fn insert_batch(&self, collection: &str, entities: &mut [&mut dyn Entity]) -> Result<()> {
        for entity in entities.iter() {
            if entity.collection() != collection {
                return Err(Error::invalid_input(format!(
                    "cannot insert a {} object into {}",
                    entity.collection(),
                    collection
                )));
            }
            if entity.meta().is_persisted() {
                return Err(Error::AlreadyExists(entity.meta().id().to_string()));
            }
        }
        if entities.is_empty() {
            return Ok(());
        }

        let t = now();
        let inserted = async {
            let mut docs = Vec::with_capacity(entities.len());
            for entity in entities.iter_mut() {
                let id = self.ids.next_id();
                docs.push(self.builder.make_insert_document(&mut **entity, t, &id)?);
            }
            self.backend()?.insert_many(collection, docs).await?;
            Ok::<(), Error>(())
        }
        .await;

        let ok = inserted.is_ok();
        for entity in entities.iter_mut() {
            if ok {
                mark_inserted(&mut **entity);
            } else {
                entity.meta_mut().clear_identity();
            }
        }
        inserted
    }

    async fn apply_changes(&self, entity: &mut dyn Entity) -> Result<()> {
        let (filter, change) = self.builder.make_change_document(&*entity, now())?;
        debug!(filter = ?filter, update = ?change.update, "Change document");

        let collection = entity.collection();
        let outcome = self
            .backend()?
            .find_and_modify(collection, filter, change)
            .await?;
        let doc = outcome
            .document
            .ok_or_else(|| not_found(collection, entity.meta().id()))?;

        entity.load_document(doc)?;
        entity.meta_mut().set_is_new(false);
        Ok(())
    }

    async fn apply_upsert(&self, entity: &mut dyn Entity, query: Document) -> Result<()> {
        let id = self.ids.next_id();
        let (filter, change) = self.builder.make_upsert_document(&*entity, query, now(), &id)?;
        debug!(filter = ?filter, update = ?change.update, "Upsert document");

        let collection = entity.collection();
        let outcome = self
            .backend()?
            .find_and_modify(collection, filter, change)
            .await?;
        let doc = outcome
            .document
            .ok_or_else(|| Error::not_found(format!("upsert on {} returned no document", collection)))?;

        entity.load_document(doc)?;
        entity.meta_mut().set_is_new(outcome.created);
        Ok(())
    }

    async fn remove_one(&self, entity: &dyn Entity) -> Result<()> {
        let filter = self.builder.make_remove_query(entity)?;
        debug!(filter = ?filter, "Remove");

        let collection = entity.collection();
        if self.backend()?.remove_one(collection, filter).await? {
            Ok(())
        } else {
            Err(not_found(collection, entity.meta().id()))
        }
    }

    async fn remove_matching(&self, collection: &str, query: Document) -> Result<u64> {
        let filter = self.builder.make_remove_all_query(collection, query)?;
        debug!(filter = ?filter, "Remove all");
        Ok(self.backend()?.remove_many(collection, filter).await?)
    }

    async fn count_matching(&self, collection: &str, query: Document) -> Result<u64> {
        let filter = self.builder.make_count_query(collection, query);
        Ok(self.backend()?.count(collection, filter).await?)
    }

    /// Feed each matching document to `f` as a fresh model, one at a time
    async fn stream_into<M, F>(&self, collection: &str, filter: Document, sort: &[&str], mut f: F) -> Result<()>
    where
        M: Model,
        F: FnMut(M) -> Result<()> + Send,
    {
        debug!(filter = ?filter, "Find each");
        let mut stream = self
            .backend()?
            .find(collection, filter, FindOptions::sorted(sort))
            .await?;

        while let Some(doc) = stream.next().await {
            f(M::from_document(doc?)?)?;
        }
        Ok(())
    }

    /// Ids picked from every join record matching `filter`
    async fn join_ids(
        &self,
        join_collection: &str,
        filter: Document,
        pick: fn(JoinRecord) -> String,
    ) -> Result<Vec<String>> {
        let mut stream = self
            .backend()?
            .find(join_collection, filter, FindOptions::default())
            .await?;

        let mut ids = Vec::new();
        while let Some(doc) = stream.next().await {
            let record: JoinRecord = serde_json::from_value(Value::Object(doc?))?;
            ids.push(pick(record));
        }
        Ok(ids)
    }

    async fn write_relation(&self, relation: &mut Relation) -> Result<()> {
        let update = self
            .builder
            .make_relation_update_documents(relation, self.ids.as_ref())?;
        let join_collection = relation.join_collection();
        let backend = self.backend()?;

        if !update.inserts.is_empty() {
            let docs = update.inserts.iter().map(JoinRecord::to_document).collect();
            backend.insert_many(join_collection, docs).await?;
        }
        if let Some(filter) = update.delete_filter {
            let removed = backend.remove_many(join_collection, filter).await?;
            debug!(removed, "Join records removed");
        }

        relation.clear_pending();
        Ok(())
    }
}

fn not_found(collection: &str, id: &str) -> Error {
    Error::not_found(format!("{} {}", collection, id))
}

fn mark_inserted(entity: &mut dyn Entity) {
    let meta = entity.meta_mut();
    meta.set_is_new(true);
    meta.clear_changes();
    entity.after_load();
}

/// Time an operation and count its outcome
async fn observed<T, Fut>(operation: &'static str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let timer = Timer::start(operation);
    let result = fut.await;
    timer.finish();

    match &result {
        Ok(_) => metrics::record_operation(operation),
        Err(Error::AccessDenied(_)) => metrics::record_access_denied(operation),
        Err(Error::Storage(err)) => {
            metrics::record_storage_error(operation);
            warn!(operation, error = %err, "Storage operation failed");
        }
        Err(_) => {}
    }
    result
}

#[async_trait]
impl RelationalDataStore for Store {
    #[instrument(skip_all, fields(join = %relation.join_collection()))]
    async fn find_related_objects<M, F>(&self, relation: &Relation, sort: &[&str], f: F) -> Result<()>
    where
        M: Model,
        F: FnMut(M) -> Result<()> + Send,
    {
        observed("find_related", async {
            let owner = relation.owner().clone();
            let join_filter = self
                .builder
                .query_by_owning_models(relation.join_collection(), &[owner]);
            let ids = self
                .join_ids(relation.join_collection(), join_filter, |r| r.related_id)
                .await?;
            if ids.is_empty() {
                return Ok(());
            }

            let collection = relation.related_collection();
            let filter = self.builder.query_by_ids(collection, &ids);
            self.stream_into(collection, filter, sort, f).await
        })
        .await
    }

    #[instrument(skip_all, fields(join = %join_collection))]
    async fn find_owning_objects<M, F>(&self, join_collection: &str, related: &dyn Entity, f: F) -> Result<()>
    where
        M: Model,
        F: FnMut(M) -> Result<()> + Send,
    {
        observed("find_owning", async {
            let join_filter = self
                .builder
                .query_by_related_models(join_collection, &[RecordRef::of(related)]);
            let ids = self
                .join_ids(join_collection, join_filter, |r| r.owning_id)
                .await?;
            if ids.is_empty() {
                return Ok(());
            }

            let filter = self.builder.query_by_ids(M::COLLECTION, &ids);
            self.stream_into(M::COLLECTION, filter, &[], f).await
        })
        .await
    }

    #[instrument(skip_all, fields(join = %relation.join_collection()))]
    async fn save_related_objects(&self, relation: &mut Relation) -> Result<()> {
        observed("save_related", self.write_relation(relation)).await
    }
}

#[async_trait]
impl DataStore for Store {
    fn set_query_builder(&mut self, builder: Arc<dyn QueryBuilder>) {
        debug!(builder = ?builder, "Query builder replaced");
        self.builder = builder;
    }

    fn close(&mut self) {
        self.session.close();
    }

    #[instrument(skip_all, fields(collection = entity.collection(), id = %entity.meta().id()))]
    async fn fetch(&self, entity: &mut dyn Entity) -> Result<()> {
        observed("fetch", self.load_by_id(entity)).await
    }

    #[instrument(skip_all, fields(collection = %collection))]
    async fn find_object(&self, collection: &str, query: Document, entity: &mut dyn Entity) -> Result<()> {
        observed("find_object", self.load_first(collection, query, entity)).await
    }

    #[instrument(skip_all, fields(collection = %collection))]
    async fn find_each<M, F>(&self, collection: &str, query: Document, sort: &[&str], f: F) -> Result<()>
    where
        M: Model,
        F: FnMut(M) -> Result<()> + Send,
    {
        observed("find_each", async {
            let filter = self.builder.make_find_query(collection, query);
            self.stream_into(collection, filter, sort, f).await
        })
        .await
    }

    #[instrument(skip_all, fields(collection = entity.collection()))]
    async fn insert_object(&self, entity: &mut dyn Entity) -> Result<()> {
        observed("insert", self.insert_one(entity)).await
    }

    #[instrument(skip_all, fields(collection = %collection, count = entities.len()))]
    async fn insert_all(&self, collection: &str, entities: &mut [&mut dyn Entity]) -> Result<()> {
        observed("insert_all", self.insert_batch(collection, entities)).await
    }

    #[instrument(skip_all, fields(collection = entity.collection(), id = %entity.meta().id()))]
    async fn update_object(&self, entity: &mut dyn Entity) -> Result<()> {
        observed("update", self.apply_changes(entity)).await
    }

    #[instrument(skip_all, fields(collection = entity.collection()))]
    async fn upsert_object(&self, entity: &mut dyn Entity, query: Document) -> Result<()> {
        observed("upsert", self.apply_upsert(entity, query)).await
    }

    #[instrument(skip_all, fields(collection = entity.collection(), id = %entity.meta().id()))]
    async fn remove_object(&self, entity: &dyn Entity) -> Result<()> {
        observed("remove", self.remove_one(entity)).await
    }

    #[instrument(skip_all, fields(collection = %collection))]
    async fn remove_all(&self, collection: &str, query: Document) -> Result<u64> {
        observed("remove_all", self.remove_matching(collection, query)).await
    }

    #[instrument(skip_all, fields(collection = %collection))]
    async fn count(&self, collection: &str, query: Document) -> Result<u64> {
        observed("count", self.count_matching(collection, query)).await
    }
}
