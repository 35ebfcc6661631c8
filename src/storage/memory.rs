//! In-memory document backend
//!
//! Collections live in a `DashMap`, each behind its own `parking_lot::RwLock`.
//! Documents keep insertion order through a sequence number. Every write,
//! including `find_and_modify`, runs under the collection's write lock, so
//! concurrent `$inc` updates of one document are applied one after another.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use tracing::instrument;

use crate::core::types::{IdSource, ObjectIdSource, ID_FIELD};
use crate::core::{Document, StorageError};
use crate::storage::matcher::{apply_update, compare_documents, matches, seed_from_filter};
use crate::storage::{
    Change, DocumentBackend, DocumentStream, FindOptions, ModifyOutcome, StorageResult,
};

#[derive(Debug, Default)]
struct Collection {
    next_seq: u64,
    docs: BTreeMap<u64, Document>,
    ids: HashMap<String, u64>,
}

impl Collection {
    fn insert(&mut self, id: String, doc: Document) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.ids.insert(id, seq);
        self.docs.insert(seq, doc);
    }

    fn remove(&mut self, seq: u64) {
        if let Some(doc) = self.docs.remove(&seq) {
            if let Some(id) = doc.get(ID_FIELD).and_then(|v| v.as_str()) {
                self.ids.remove(id);
            }
        }
    }

    fn first_match(&self, filter: &Document) -> StorageResult<Option<u64>> {
        for (seq, doc) in &self.docs {
            if matches(doc, filter)? {
                return Ok(Some(*seq));
            }
        }
        Ok(None)
    }

    fn all_matches(&self, filter: &Document) -> StorageResult<Vec<u64>> {
        let mut found = Vec::new();
        for (seq, doc) in &self.docs {
            if matches(doc, filter)? {
                found.push(*seq);
            }
        }
        Ok(found)
    }
}

type SharedCollection = Arc<RwLock<Collection>>;

fn document_id(collection: &str, doc: &Document) -> StorageResult<String> {
    doc.get(ID_FIELD)
        .and_then(|v| v.as_str())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            StorageError::invalid_update(format!("document for {} has no {}", collection, ID_FIELD))
        })
}

/// In-process implementation of [`DocumentBackend`]
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: DashMap<String, SharedCollection>,
}

impl MemoryBackend {
    /// Creates an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend wrapped in Arc
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn collection(&self, name: &str) -> SharedCollection {
        self.collections
            .entry(name.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn existing(&self, name: &str) -> Option<SharedCollection> {
        self.collections.get(name).map(|c| c.value().clone())
    }

    /// Names of collections that have been written to
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    #[instrument(level = "trace", skip(self, docs), fields(count = docs.len()))]
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> StorageResult<()> {
        let target = self.collection(collection);
        let mut guard = target.write();

        let mut batch = HashSet::new();
        let mut keyed = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = document_id(collection, &doc)?;
            if guard.ids.contains_key(&id) || !batch.insert(id.clone()) {
                return Err(StorageError::DuplicateKey {
                    collection: collection.to_string(),
                    id,
                });
            }
            keyed.push((id, doc));
        }

        for (id, doc) in keyed {
            guard.insert(id, doc);
        }
        Ok(())
    }

    #[instrument(level = "trace", skip(self, filter))]
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StorageResult<DocumentStream> {
        let Some(source) = self.existing(collection) else {
            return Ok(stream::empty().boxed());
        };

        let mut seqs = {
            let guard = source.read();
            let mut seqs = guard.all_matches(&filter)?;
            if !options.sort.is_empty() {
                seqs.sort_by(|a, b| match (guard.docs.get(a), guard.docs.get(b)) {
                    (Some(x), Some(y)) => compare_documents(x, y, &options.sort),
                    _ => std::cmp::Ordering::Equal,
                });
            }
            seqs
        };

        if let Some(limit) = options.limit {
            seqs.truncate(limit);
        }

        // Documents are cloned one at a time as the consumer pulls them;
        // any removed in the meantime are skipped.
        let results = stream::iter(seqs).filter_map(move |seq| {
            let doc = source.read().docs.get(&seq).cloned();
            async move { doc.map(Ok) }
        });

        Ok(results.boxed())
    }

    async fn find_one(&self, collection: &str, filter: Document) -> StorageResult<Option<Document>> {
        let Some(source) = self.existing(collection) else {
            return Ok(None);
        };

        let guard = source.read();
        Ok(guard
            .first_match(&filter)?
            .and_then(|seq| guard.docs.get(&seq).cloned()))
    }

    async fn count(&self, collection: &str, filter: Document) -> StorageResult<u64> {
        let Some(source) = self.existing(collection) else {
            return Ok(0);
        };

        let guard = source.read();
        Ok(guard.all_matches(&filter)?.len() as u64)
    }

    #[instrument(level = "trace", skip(self, filter, change), fields(upsert = change.upsert))]
    async fn find_and_modify(
        &self,
        collection: &str,
        filter: Document,
        change: Change,
    ) -> StorageResult<ModifyOutcome> {
        let target = self.collection(collection);
        let mut guard = target.write();

        if let Some(seq) = guard.first_match(&filter)? {
            let Some(current) = guard.docs.get(&seq).cloned() else {
                return Ok(ModifyOutcome::default());
            };

            let mut updated = current.clone();
            apply_update(&mut updated, &change.update, false)?;
            if updated.get(ID_FIELD) != current.get(ID_FIELD) {
                return Err(StorageError::invalid_update("the _id field is immutable"));
            }
            guard.docs.insert(seq, updated.clone());

            return Ok(ModifyOutcome {
                document: Some(if change.return_new { updated } else { current }),
                created: false,
            });
        }

        if !change.upsert {
            return Ok(ModifyOutcome::default());
        }

        let mut created = seed_from_filter(&filter)?;
        apply_update(&mut created, &change.update, true)?;
        if !created.contains_key(ID_FIELD) {
            created.insert(ID_FIELD.to_string(), ObjectIdSource.next_id().into());
        }

        let id = document_id(collection, &created)?;
        if guard.ids.contains_key(&id) {
            return Err(StorageError::DuplicateKey {
                collection: collection.to_string(),
                id,
            });
        }
        guard.insert(id, created.clone());

        Ok(ModifyOutcome {
            document: change.return_new.then_some(created),
            created: true,
        })
    }

    async fn remove_one(&self, collection: &str, filter: Document) -> StorageResult<bool> {
        let Some(target) = self.existing(collection) else {
            return Ok(false);
        };

        let mut guard = target.write();
        match guard.first_match(&filter)? {
            Some(seq) => {
                guard.remove(seq);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_many(&self, collection: &str, filter: Document) -> StorageResult<u64> {
        let Some(target) = self.existing(collection) else {
            return Ok(0);
        };

        let mut guard = target.write();
        let found = guard.all_matches(&filter)?;
        for seq in &found {
            guard.remove(*seq);
        }
        Ok(found.len() as u64)
    }
}
