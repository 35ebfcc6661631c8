//! Background tasks (`Task`) queued on behalf of a user

use crate::core::types::OWNER_POINTER_FIELD;
use crate::core::Result;
use crate::datastore::DataStore;
use crate::entities::{fetch_pointer, AnyEntity, User};
use crate::model::{parse_pointer, pointer_string, BaseModel, Model, Pointer};
use crate::model_fields;
use crate::query::filter::{in_array, single};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Status of a task nobody has picked up yet
pub const STATUS_NEW: &str = "NEW";

/// A unit of background work
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Task {
    #[serde(flatten)]
    base: BaseModel,

    /// Human-readable outcome
    #[serde(rename = "taskMessage", default)]
    pub message: String,

    /// Processing status
    #[serde(rename = "taskStatus", default)]
    pub status: String,

    /// Handler to run
    #[serde(rename = "taskAction", default)]
    pub action: String,

    /// Worker queue the task belongs to
    #[serde(rename = "taskType", default)]
    pub task_type: String,

    /// Handler arguments; pointer documents are resolved by
    /// [`Task::fetch_parameters`]
    #[serde(rename = "taskParameters", default)]
    pub parameters: Vec<Value>,

    /// Number of workers that claimed the task
    #[serde(rename = "taskClaimed", default)]
    pub claimed: i64,

    #[serde(rename = "_p_user", default, skip_serializing_if = "String::is_empty")]
    user_ptr: String,

    #[serde(skip)]
    user: Option<User>,
}

model_fields!(Task {
    "Message" => message: "taskMessage",
    "Status" => status: "taskStatus",
    "Action" => action: "taskAction",
    "Type" => task_type: "taskType",
    "Parameters" => parameters: "taskParameters",
    "Claimed" => claimed: "taskClaimed",
    "UserPtr" => user_ptr: "_p_user",
});

impl Model for Task {
    const COLLECTION: &'static str = "Task";

    fn base(&self) -> &BaseModel {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseModel {
        &mut self.base
    }

    fn on_load(&mut self) {
        let Some((collection, id)) = parse_pointer(&self.user_ptr) else {
            return;
        };
        if collection != User::COLLECTION {
            return;
        }
        if self.user.as_ref().map(|u| u.object_id()) != Some(id) {
            self.user = Some(User::with_id(id));
        }
    }
}

impl Task {
    /// New task owned by `user`
    pub fn for_user(user: &User, task_type: &str, action: &str, parameters: Vec<Value>) -> Result<Self> {
        let mut task = Self::default();
        task.set("UserPtr", pointer_string(User::COLLECTION, user.object_id()))?;
        task.set("Type", task_type)?;
        task.set("Action", action)?;
        task.set("Parameters", parameters)?;
        task.set("Status", STATUS_NEW)?;
        task.set("Claimed", 0)?;
        task.user = Some(user.clone());
        Ok(task)
    }

    /// Owning user, as loaded so far
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Owner pointer string (`_User$<id>`)
    pub fn user_pointer(&self) -> &str {
        &self.user_ptr
    }

    /// Filter selecting every task owned by `user`
    pub fn owned_by(user: &User) -> crate::core::Document {
        single(
            OWNER_POINTER_FIELD,
            Value::from(pointer_string(User::COLLECTION, user.object_id())),
        )
    }

    /// Resolve pointer parameters to their documents and load the owner
    pub async fn fetch_parameters<D: DataStore>(&mut self, ds: &D) -> Result<(Vec<Param>, User)> {
        let mut loaded = Vec::with_capacity(self.parameters.len());
        for param in &self.parameters {
            match Pointer::from_value(param) {
                Some(pointer) => loaded.push(Param::Entity(fetch_pointer(&pointer, ds).await?)),
                None => loaded.push(Param::Value(param.clone())),
            }
        }

        let mut user = self.user.take().unwrap_or_default();
        let fetched = user.fetch(ds).await;
        self.user = Some(user.clone());
        fetched?;

        Ok((loaded, user))
    }

    /// Visit unclaimed tasks of the given types
    pub async fn find_each_new<D, F>(ds: &D, types: &[&str], f: F) -> Result<()>
    where
        D: DataStore,
        F: FnMut(Task) -> Result<()> + Send,
    {
        let mut query = in_array("taskType", types);
        query.insert("taskClaimed".to_string(), json!(0));
        ds.find_each(Self::COLLECTION, query, &[], f).await
    }

    /// Visit tasks claimed exactly once
    pub async fn find_each_claimed<D, F>(ds: &D, f: F) -> Result<()>
    where
        D: DataStore,
        F: FnMut(Task) -> Result<()> + Send,
    {
        ds.find_each(Self::COLLECTION, single("taskClaimed", json!(1)), &[], f)
            .await
    }
}

/// A task parameter after pointer resolution
#[derive(Debug, Clone)]
pub enum Param {
    /// Plain value
    Value(Value),
    /// Document a pointer parameter referred to
    Entity(AnyEntity),
}
