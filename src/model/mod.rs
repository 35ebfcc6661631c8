//! Entity model: identity, change tracking, field tables and relations
//!
//! Every persisted type implements [`Model`]. The object-safe [`Entity`]
//! view of a model is what the query builders and the DataStore operate on;
//! it is provided for every `Model` by a blanket impl.

pub mod base;
pub mod changes;
pub mod pointer;
pub mod relation;

pub use base::BaseModel;
pub use changes::{ChangeSet, UpdateOperator};
pub use pointer::{parse_pointer, pointer_string, Pointer};
pub use relation::{join_collection_name, JoinRecord, RecordRef, Relation};

use crate::core::{Document, Error, Result};
use crate::datastore::DataStore;
use crate::security::Acl;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Compile-time table from logical field name to storage key
///
/// Implemented with [`model_fields!`](crate::model_fields).
pub trait Fields {
    /// Type name used in error messages
    const MODEL_NAME: &'static str;

    /// Storage key of a logical field
    fn storage_key(field: &str) -> Option<&'static str>;

    /// Assign a field from a JSON value, returning its storage key
    fn write_field(&mut self, field: &str, value: Value) -> Result<&'static str>;

    /// Read a field as a JSON value
    fn read_field(&self, field: &str) -> Result<Value>;

    /// Reset a field to its default, returning its storage key
    fn clear_field(&mut self, field: &str) -> Result<&'static str>;
}

/// Declare the logical-name to storage-key table of an entity type
///
/// ```ignore
/// model_fields!(Task {
///     "Status" => status: "taskStatus",
///     "Claimed" => claimed: "taskClaimed",
/// });
/// ```
#[macro_export]
macro_rules! model_fields {
    ($model:ident { $($name:literal => $field:ident : $key:literal),* $(,)? }) => {
        impl $crate::model::Fields for $model {
            const MODEL_NAME: &'static str = stringify!($model);

            fn storage_key(field: &str) -> Option<&'static str> {
                match field {
                    $($name => Some($key),)*
                    _ => None,
                }
            }

            fn write_field(
                &mut self,
                field: &str,
                value: $crate::__private::serde_json::Value,
            ) -> $crate::Result<&'static str> {
                match field {
                    $($name => {
                        self.$field = $crate::__private::serde_json::from_value(value)?;
                        Ok($key)
                    })*
                    _ => Err($crate::Error::UnknownField {
                        model: stringify!($model),
                        field: field.to_string(),
                    }),
                }
            }

            fn read_field(&self, field: &str) -> $crate::Result<$crate::__private::serde_json::Value> {
                match field {
                    $($name => Ok($crate::__private::serde_json::to_value(&self.$field)?),)*
                    _ => Err($crate::Error::UnknownField {
                        model: stringify!($model),
                        field: field.to_string(),
                    }),
                }
            }

            fn clear_field(&mut self, field: &str) -> $crate::Result<&'static str> {
                match field {
                    $($name => {
                        self.$field = Default::default();
                        Ok($key)
                    })*
                    _ => Err($crate::Error::UnknownField {
                        model: stringify!($model),
                        field: field.to_string(),
                    }),
                }
            }
        }
    };
}

/// A persisted document type
#[async_trait]
pub trait Model: Fields + Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Collection the type is stored in
    const COLLECTION: &'static str;

    /// Shared entity state
    fn base(&self) -> &BaseModel;

    /// Mutable shared entity state
    fn base_mut(&mut self) -> &mut BaseModel;

    /// Reattach transient state after deserialization or a write
    fn on_load(&mut self) {}

    /// Handle on an existing document by id
    fn with_id(id: impl Into<String>) -> Self {
        let mut model = Self::default();
        model.base_mut().set_id(id);
        model.on_load();
        model
    }

    /// Build from a stored document
    fn from_document(doc: Document) -> Result<Self> {
        let mut model: Self = serde_json::from_value(Value::Object(doc))?;
        model.on_load();
        Ok(model)
    }

    /// Assign a field by logical name and record a `$set`
    fn set<V: Serialize>(&mut self, field: &str, value: V) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let key = self.write_field(field, value.clone())?;
        self.base_mut().changes_mut().set(key, value);
        Ok(())
    }

    /// Reset a field by logical name and record an `$unset`
    fn unset(&mut self, field: &str) -> Result<()> {
        let key = self.clear_field(field)?;
        self.base_mut().changes_mut().unset(key);
        Ok(())
    }

    /// Read a field by logical name
    fn get(&self, field: &str) -> Result<Value> {
        self.read_field(field)
    }

    /// Record an atomic `$inc`; the in-memory value is stale until re-fetched
    fn increment(&mut self, field: &str, delta: i64) -> Result<()> {
        let key = Self::storage_key(field).ok_or_else(|| Error::UnknownField {
            model: Self::MODEL_NAME,
            field: field.to_string(),
        })?;
        self.base_mut().changes_mut().increment(key, delta);
        Ok(())
    }

    /// Object id; empty until persisted
    fn object_id(&self) -> &str {
        self.base().id()
    }

    /// Permission set
    fn acl(&self) -> &Acl {
        self.base().acl()
    }

    /// Replace the permission set and record the change
    fn set_acl(&mut self, acl: Acl) {
        self.base_mut().set_acl(acl);
    }

    /// Whether the last persistence call created the document
    fn is_new(&self) -> bool {
        self.base().is_new()
    }

    /// Reload from storage by id
    async fn fetch<D: DataStore>(&mut self, ds: &D) -> Result<()> {
        ds.fetch(self).await
    }

    /// Insert when the id is empty, otherwise apply pending changes atomically
    async fn save<D: DataStore>(&mut self, ds: &D) -> Result<()> {
        if self.base().is_persisted() {
            ds.update_object(self).await
        } else {
            ds.insert_object(self).await
        }
    }

    /// Remove from storage
    async fn delete<D: DataStore>(&self, ds: &D) -> Result<()> {
        ds.remove_object(self).await
    }
}

/// Object-safe view of a model used by query builders and the DataStore
pub trait Entity: Send + Sync {
    /// Collection the entity is stored in
    fn collection(&self) -> &'static str;

    /// Shared entity state
    fn meta(&self) -> &BaseModel;

    /// Mutable shared entity state
    fn meta_mut(&mut self) -> &mut BaseModel;

    /// Serialize the persisted fields
    fn to_document(&self) -> Result<Document>;

    /// Replace this entity with a stored document and run the post-load hook
    fn load_document(&mut self, doc: Document) -> Result<()>;

    /// Run the post-load hook
    fn after_load(&mut self);
}

impl<M: Model> Entity for M {
    fn collection(&self) -> &'static str {
        M::COLLECTION
    }

    fn meta(&self) -> &BaseModel {
        self.base()
    }

    fn meta_mut(&mut self) -> &mut BaseModel {
        self.base_mut()
    }

    fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(doc) => Ok(doc),
            other => Err(Error::invalid_input(format!(
                "{} serialized to a non-object value: {}",
                M::MODEL_NAME,
                other
            ))),
        }
    }

    fn load_document(&mut self, doc: Document) -> Result<()> {
        *self = M::from_document(doc)?;
        Ok(())
    }

    fn after_load(&mut self) {
        self.on_load();
    }
}
