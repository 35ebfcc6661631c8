//! Per-type email settings (`EmailMetadata`)

use crate::core::Result;
use crate::datastore::DataStore;
use crate::model::{BaseModel, Model};
use crate::model_fields;
use crate::query::filter::single;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maps an entity attribute onto a template tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMetadataParameter {
    /// Attribute read from the source entity
    #[serde(rename = "attributeName", default)]
    pub attribute_name: String,
    /// Template tag receiving the value
    #[serde(default)]
    pub tag: String,
    /// Optional transformation applied to the value
    #[serde(default)]
    pub transformation: String,
}

impl EmailMetadataParameter {
    /// Copy `attribute` into `tag` unchanged
    pub fn tag(attribute: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            attribute_name: attribute.into(),
            tag: tag.into(),
            transformation: String::new(),
        }
    }

    /// Copy `attribute` into `tag` through `transformation`
    pub fn transform(
        attribute: impl Into<String>,
        tag: impl Into<String>,
        transformation: impl Into<String>,
    ) -> Self {
        Self {
            attribute_name: attribute.into(),
            tag: tag.into(),
            transformation: transformation.into(),
        }
    }
}

/// Template, subject and parameters used for one email type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailMetadata {
    #[serde(flatten)]
    base: BaseModel,

    /// Email type this entry configures
    #[serde(rename = "emailType", default)]
    pub email_type: String,

    /// Template rendered for the body
    #[serde(rename = "templateId", default)]
    pub template_id: String,

    /// Subject line
    #[serde(default)]
    pub subject: String,

    /// Tag bindings
    #[serde(default)]
    pub parameters: Vec<EmailMetadataParameter>,

    /// Whether emails of this type are sent
    #[serde(rename = "isActive", default)]
    pub is_active: bool,
}

model_fields!(EmailMetadata {
    "EmailType" => email_type: "emailType",
    "TemplateId" => template_id: "templateId",
    "Subject" => subject: "subject",
    "Parameters" => parameters: "parameters",
    "IsActive" => is_active: "isActive",
});

impl Model for EmailMetadata {
    const COLLECTION: &'static str = "EmailMetadata";

    fn base(&self) -> &BaseModel {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseModel {
        &mut self.base
    }
}

impl EmailMetadata {
    /// Unsaved settings for `email_type`
    pub fn from_template(
        template_id: &str,
        email_type: &str,
        subject: &str,
        parameters: Vec<EmailMetadataParameter>,
        active: bool,
    ) -> Result<Self> {
        let mut metadata = Self::default();
        metadata.set("TemplateId", template_id)?;
        metadata.set("EmailType", email_type)?;
        metadata.set("Subject", subject)?;
        metadata.set("Parameters", parameters)?;
        metadata.set("IsActive", active)?;
        Ok(metadata)
    }

    /// Load the settings stored for `email_type`
    pub async fn find_for_email_type<D: DataStore>(ds: &D, email_type: &str) -> Result<Self> {
        let mut metadata = Self::default();
        ds.find_object(
            Self::COLLECTION,
            single("emailType", Value::from(email_type)),
            &mut metadata,
        )
        .await?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parameter_wire_format() {
        let plain = EmailMetadataParameter::tag("firstName", "-name-");
        assert_eq!(
            serde_json::to_value(&plain).unwrap(),
            json!({"attributeName": "firstName", "tag": "-name-", "transformation": ""})
        );

        let upper = EmailMetadataParameter::transform("username", "-user-", "upper");
        let back: EmailMetadataParameter =
            serde_json::from_value(json!({"attributeName": "username", "tag": "-user-", "transformation": "upper"}))
                .unwrap();
        assert_eq!(back, upper);
    }

    #[test]
    fn test_from_template_uses_field_table() {
        let mut metadata = EmailMetadata::from_template(
            "tpl-9",
            "RESET",
            "Reset your password",
            vec![EmailMetadataParameter::tag("email", "-email-")],
            true,
        )
        .unwrap();

        assert_eq!(metadata.get("EmailType").unwrap(), json!("RESET"));
        assert_eq!(metadata.get("IsActive").unwrap(), json!(true));
        assert_eq!(metadata.parameters.len(), 1);
        assert!(metadata.set("Unknown", 1).is_err());
    }
}
