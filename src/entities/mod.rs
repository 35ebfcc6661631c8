//! Built-in entity types

pub mod email_metadata;
pub mod email_record;
pub mod role;
pub mod task;
pub mod user;

pub use email_metadata::{EmailMetadata, EmailMetadataParameter};
pub use email_record::{EmailRecord, Substitution};
pub use role::Role;
pub use task::{Param, Task};
pub use user::User;

use crate::core::{Error, Result};
use crate::datastore::DataStore;
use crate::model::{Model, Pointer};

/// Any built-in entity, as produced by resolving a pointer
#[derive(Debug, Clone)]
pub enum AnyEntity {
    /// A `_User` document
    User(User),
    /// A `_Role` document
    Role(Role),
    /// A `Task` document
    Task(Task),
    /// An `EmailRecord` document
    EmailRecord(EmailRecord),
    /// An `EmailMetadata` document
    EmailMetadata(EmailMetadata),
}

impl AnyEntity {
    /// Collection of the wrapped entity
    pub fn collection(&self) -> &'static str {
        match self {
            Self::User(_) => User::COLLECTION,
            Self::Role(_) => Role::COLLECTION,
            Self::Task(_) => Task::COLLECTION,
            Self::EmailRecord(_) => EmailRecord::COLLECTION,
            Self::EmailMetadata(_) => EmailMetadata::COLLECTION,
        }
    }

    /// Id of the wrapped entity
    pub fn object_id(&self) -> &str {
        match self {
            Self::User(m) => m.object_id(),
            Self::Role(m) => m.object_id(),
            Self::Task(m) => m.object_id(),
            Self::EmailRecord(m) => m.object_id(),
            Self::EmailMetadata(m) => m.object_id(),
        }
    }
}

/// Load the document a pointer refers to
pub async fn fetch_pointer<D: DataStore>(pointer: &Pointer, ds: &D) -> Result<AnyEntity> {
    let id = pointer.object_id.as_str();
    match pointer.class_name.as_str() {
        c if c == User::COLLECTION => {
            let mut user = User::with_id(id);
            user.fetch(ds).await?;
            Ok(AnyEntity::User(user))
        }
        c if c == Role::COLLECTION => {
            let mut role = Role::with_id(id);
            role.fetch(ds).await?;
            Ok(AnyEntity::Role(role))
        }
        c if c == Task::COLLECTION => {
            let mut task = Task::with_id(id);
            task.fetch(ds).await?;
            Ok(AnyEntity::Task(task))
        }
        c if c == EmailRecord::COLLECTION => {
            let mut record = EmailRecord::with_id(id);
            record.fetch(ds).await?;
            Ok(AnyEntity::EmailRecord(record))
        }
        c if c == EmailMetadata::COLLECTION => {
            let mut metadata = EmailMetadata::with_id(id);
            metadata.fetch(ds).await?;
            Ok(AnyEntity::EmailMetadata(metadata))
        }
        other => Err(Error::invalid_input(format!("Unknown object className: {}", other))),
    }
}
