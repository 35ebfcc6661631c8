//! Named roles (`_Role`) and their user membership

use crate::core::Result;
use crate::datastore::{DataStore, RelationalDataStore};
use crate::entities::User;
use crate::model::{BaseModel, Model, Relation};
use crate::model_fields;
use crate::query::filter::single;
use crate::security::Acl;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Relation name of role membership
pub const USERS_RELATION: &str = "users";

/// Join collection of role membership
pub const USERS_JOIN: &str = "_Join:users:_Role";

/// A named role granting its members `role:<name>` access
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Role {
    #[serde(flatten)]
    base: BaseModel,

    /// Role name
    #[serde(default)]
    pub name: String,

    #[serde(skip)]
    users: Relation,
}

model_fields!(Role {
    "Name" => name: "name",
});

impl Model for Role {
    const COLLECTION: &'static str = "_Role";

    fn base(&self) -> &BaseModel {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseModel {
        &mut self.base
    }

    fn on_load(&mut self) {
        self.attach_users();
    }
}

impl Role {
    /// Unsaved role with a name
    pub fn named(name: impl Into<String>) -> Self {
        let mut role = Self {
            name: name.into(),
            ..Self::default()
        };
        role.attach_users();
        role
    }

    /// Members of this role; pending adds and removes are written by
    /// [`RelationalDataStore::save_related_objects`]
    pub fn users(&mut self) -> &mut Relation {
        self.attach_users();
        &mut self.users
    }

    fn attach_users(&mut self) {
        self.users
            .attach(USERS_RELATION, Self::COLLECTION, &self.base, User::COLLECTION);
    }

    /// Create or update the role with this name, applying `acl`
    pub async fn upsert_by_name<D: DataStore>(ds: &D, name: &str, acl: Acl) -> Result<Self> {
        let mut role = Self::default();
        role.set("Name", name)?;
        role.set_acl(acl);
        ds.upsert_object(&mut role, single("name", Value::from(name)))
            .await?;
        Ok(role)
    }

    /// Load the role with this name
    pub async fn find_by_name<D: DataStore>(ds: &D, name: &str) -> Result<Self> {
        let mut role = Self::default();
        ds.find_object(Self::COLLECTION, single("name", Value::from(name)), &mut role)
            .await?;
        Ok(role)
    }

    /// Roles the user is a member of
    pub async fn roles_for_user<D: RelationalDataStore>(user: &User, ds: &D) -> Result<Vec<Self>> {
        let mut roles = Vec::new();
        ds.find_owning_objects(USERS_JOIN, user, |role: Role| {
            roles.push(role);
            Ok(())
        })
        .await?;

        debug!(count = roles.len(), user = %user.object_id(), "Roles found for user");
        Ok(roles)
    }
}
