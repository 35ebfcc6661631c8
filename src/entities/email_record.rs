//! Outgoing transactional emails (`EmailRecord`)

use crate::core::Result;
use crate::datastore::DataStore;
use crate::entities::User;
use crate::model::{BaseModel, Model};
use crate::model_fields;
use crate::query::filter::single;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category every record carries ahead of its email type
pub const CATEGORY_TRANSACTIONAL: &str = "transactional";

/// A template tag and the value it is replaced with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    /// Tag as it appears in the template
    #[serde(default)]
    pub tag: String,
    /// Replacement text
    #[serde(rename = "val", default)]
    pub value: String,
}

impl Substitution {
    /// Replace `tag` with `value`
    pub fn new(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            value: value.into(),
        }
    }
}

/// An email rendered from a template and addressed to one recipient
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailRecord {
    #[serde(flatten)]
    base: BaseModel,

    /// Recipient address
    #[serde(default)]
    pub to: String,

    /// Sender address
    #[serde(default)]
    pub from: String,

    /// Template rendered for the body
    #[serde(rename = "templateId", default)]
    pub template_id: String,

    /// Subject line
    #[serde(default)]
    pub subject: String,

    /// Delivery categories
    #[serde(default)]
    pub category: Vec<String>,

    /// Template substitutions
    #[serde(default)]
    pub substitutions: Vec<Substitution>,

    /// Whether the record is still pending delivery
    #[serde(rename = "isActive", default)]
    pub is_active: bool,
}

model_fields!(EmailRecord {
    "To" => to: "to",
    "From" => from: "from",
    "TemplateId" => template_id: "templateId",
    "Subject" => subject: "subject",
    "Category" => category: "category",
    "Substitutions" => substitutions: "substitutions",
    "IsActive" => is_active: "isActive",
});

impl Model for EmailRecord {
    const COLLECTION: &'static str = "EmailRecord";

    fn base(&self) -> &BaseModel {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseModel {
        &mut self.base
    }
}

impl EmailRecord {
    /// Unsaved record addressed to `user`, categorised as transactional
    /// mail of `email_type`
    pub fn for_user(
        user: &User,
        from: &str,
        email_type: &str,
        template_id: &str,
        subject: &str,
        substitutions: Vec<Substitution>,
    ) -> Result<Self> {
        let mut record = Self::default();
        record.set("To", &user.email)?;
        record.set("From", from)?;
        record.set("Subject", subject)?;
        record.set("Category", [CATEGORY_TRANSACTIONAL, email_type])?;
        record.set("TemplateId", template_id)?;
        record.set("Substitutions", substitutions)?;
        Ok(record)
    }

    /// Every record addressed to the user's email
    pub async fn find_for_user<D: DataStore>(ds: &D, user: &User) -> Result<Vec<Self>> {
        let mut records = Vec::new();
        ds.find_each(
            Self::COLLECTION,
            single("to", Value::from(user.email.as_str())),
            &[],
            |record: EmailRecord| {
                records.push(record);
                Ok(())
            },
        )
        .await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UpdateOperator;
    use serde_json::json;

    #[test]
    fn test_for_user_records_every_field() {
        let mut user = User::with_id("u1");
        user.email = "a@b.io".into();

        let record = EmailRecord::for_user(
            &user,
            "team@rowguard.dev",
            "WELCOME",
            "tpl-1",
            "Hello",
            vec![Substitution::new("-name-", "Ann")],
        )
        .unwrap();

        assert_eq!(record.to, "a@b.io");
        assert_eq!(record.category, vec!["transactional", "WELCOME"]);
        assert!(!record.is_active);

        let set = record.base().changes().get(UpdateOperator::Set).unwrap();
        assert_eq!(set["category"], json!(["transactional", "WELCOME"]));
        assert_eq!(set["substitutions"], json!([{"tag": "-name-", "val": "Ann"}]));
        assert_eq!(set.len(), 6);
    }
}
