//! Query builder without access checks

use crate::core::types::ID_FIELD;
use crate::core::{Document, Error, IdSource, Result, Timestamp};
use crate::model::{Entity, JoinRecord, RecordRef, Relation};
use crate::query::filter::{by_id, in_array};
use crate::query::{Change, QueryBuilder, RelationUpdate};
use serde_json::{json, Value};

const RELATED_ID_FIELD: &str = "relatedId";
const OWNING_ID_FIELD: &str = "owningId";

/// Identity strategy: filters pass through, updates come straight from the
/// entity's change set
#[derive(Debug, Default, Clone, Copy)]
pub struct UnrestrictedQueryBuilder;

impl UnrestrictedQueryBuilder {
    /// Create the builder
    pub fn new() -> Self {
        Self
    }
}

fn require_id(entity: &dyn Entity) -> Result<&str> {
    match entity.meta().id() {
        "" => Err(Error::MissingIdentity),
        id => Ok(id),
    }
}

impl QueryBuilder for UnrestrictedQueryBuilder {
    fn make_count_query(&self, _collection: &str, query: Document) -> Document {
        query
    }

    fn make_find_query(&self, _collection: &str, query: Document) -> Document {
        query
    }

    fn make_find_by_id_query(&self, entity: &dyn Entity) -> Result<Document> {
        Ok(by_id(require_id(entity)?))
    }

    fn make_remove_query(&self, entity: &dyn Entity) -> Result<Document> {
        Ok(by_id(require_id(entity)?))
    }

    fn make_remove_all_query(&self, _collection: &str, query: Document) -> Result<Document> {
        Ok(query)
    }

    fn make_insert_document(&self, entity: &mut dyn Entity, now: Timestamp, id: &str) -> Result<Document> {
        let meta = entity.meta_mut();
        meta.set_id(id);
        meta.set_created_at(now);
        meta.set_updated_at(now);
        entity.to_document()
    }

    fn make_change_document(&self, entity: &dyn Entity, now: Timestamp) -> Result<(Document, Change)> {
        let query = by_id(require_id(entity)?);
        Ok((
            query,
            Change {
                update: entity.meta().update(now),
                upsert: false,
                return_new: true,
            },
        ))
    }

    fn make_upsert_document(
        &self,
        entity: &dyn Entity,
        query: Document,
        now: Timestamp,
        id: &str,
    ) -> Result<(Document, Change)> {
        Ok((
            query,
            Change {
                update: entity.meta().upsert(now, id),
                upsert: true,
                return_new: true,
            },
        ))
    }

    fn query_by_related_models(&self, _join_collection: &str, related: &[RecordRef]) -> Document {
        let ids: Vec<&str> = related.iter().map(|r| r.id.as_str()).collect();
        in_array(RELATED_ID_FIELD, &ids)
    }

    fn query_by_owning_models(&self, _join_collection: &str, owning: &[RecordRef]) -> Document {
        let ids: Vec<&str> = owning.iter().map(|r| r.id.as_str()).collect();
        in_array(OWNING_ID_FIELD, &ids)
    }

    fn query_by_ids(&self, _collection: &str, ids: &[String]) -> Document {
        in_array(ID_FIELD, ids)
    }

    fn make_relation_update_documents(&self, relation: &Relation, ids: &dyn IdSource) -> Result<RelationUpdate> {
        let owner = relation.owner();
        if !owner.is_persisted() {
            return Err(Error::UnsavedOwner);
        }

        let mut inserts = Vec::new();
        for related in relation.inserting() {
            if !related.is_persisted() {
                return Err(Error::UnsavedRelatedEntity);
            }
            inserts.push(JoinRecord {
                id: ids.next_id(),
                related_id: related.id.clone(),
                owning_id: owner.id.clone(),
            });
        }

        let removing = relation.removing();
        let delete_filter = (!removing.is_empty()).then(|| {
            let clauses: Vec<Value> = removing
                .iter()
                .map(|related| {
                    json!({
                        RELATED_ID_FIELD: related.id,
                        OWNING_ID_FIELD: owner.id,
                    })
                })
                .collect();

            let mut filter = Document::new();
            filter.insert("$or".to_string(), Value::Array(clauses));
            filter
        });

        Ok(RelationUpdate {
            inserts,
            delete_filter,
        })
    }
}
