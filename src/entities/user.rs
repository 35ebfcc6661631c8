//! User accounts (`_User`)

use crate::core::{Document, Error, Result};
use crate::datastore::DataStore;
use crate::model::{BaseModel, Model};
use crate::model_fields;
use crate::query::filter::single;
use crate::security::PasswordHasher;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A user account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    base: BaseModel,

    /// Login email
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,

    /// Login name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    #[serde(rename = "_hashed_password", default, skip_serializing_if = "String::is_empty")]
    hashed_password: String,

    /// Display name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Given name, capitalised
    #[serde(rename = "firstName", default, skip_serializing_if = "String::is_empty")]
    pub first_name: String,

    /// Free-form gender
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gender: String,

    /// Application-defined extra fields
    #[serde(rename = "customFields", default, skip_serializing_if = "Document::is_empty")]
    pub custom_fields: Document,
}

model_fields!(User {
    "Email" => email: "email",
    "Username" => username: "username",
    "HashedPassword" => hashed_password: "_hashed_password",
    "Name" => name: "name",
    "FirstName" => first_name: "firstName",
    "Gender" => gender: "gender",
    "CustomFields" => custom_fields: "customFields",
});

impl Model for User {
    const COLLECTION: &'static str = "_User";

    fn base(&self) -> &BaseModel {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseModel {
        &mut self.base
    }
}

impl User {
    /// Validate sign-up input and build an unsaved user
    ///
    /// Email must contain `@`; username must be non-blank and free of
    /// markup; the password may not be blank or carry surrounding
    /// whitespace. A non-empty first name is trimmed and capitalised.
    pub fn from_email(
        email: &str,
        username: &str,
        password: &str,
        first_name: &str,
        hasher: &dyn PasswordHasher,
    ) -> Result<Self> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::invalid_input("Invalid email"));
        }

        let trimmed_username = username.trim();
        if trimmed_username.is_empty() || has_markup(username) {
            return Err(Error::invalid_input("Invalid username"));
        }

        validate_password(password)?;

        let mut user = Self::default();
        user.set("Email", email)?;
        user.set("Username", trimmed_username)?;
        user.set("HashedPassword", hasher.hash(password)?)?;

        if !first_name.is_empty() {
            let first_name = first_name.trim();
            if first_name.is_empty() || has_markup(first_name) {
                return Err(Error::invalid_input("Invalid first name"));
            }
            user.set("FirstName", capitalize(first_name))?;
        }

        Ok(user)
    }

    /// Replace the password hash and save
    pub async fn change_password<D: DataStore>(
        &mut self,
        password: &str,
        hasher: &dyn PasswordHasher,
        ds: &D,
    ) -> Result<()> {
        validate_password(password)?;
        self.set("HashedPassword", hasher.hash(password)?)?;
        self.save(ds).await
    }

    /// Check a plaintext password against the stored hash
    pub fn check_password(&self, password: &str, hasher: &dyn PasswordHasher) -> bool {
        !self.hashed_password.is_empty() && hasher.verify(password, &self.hashed_password)
    }

    /// Set one custom field, recording the whole map as changed
    pub fn set_custom_field(&mut self, key: &str, value: impl Serialize) -> Result<()> {
        let mut fields = self.custom_fields.clone();
        fields.insert(key.to_string(), serde_json::to_value(value)?);
        self.set("CustomFields", fields)
    }

    /// Load the user with the given username
    pub async fn find_by_username<D: DataStore>(ds: &D, username: &str) -> Result<Self> {
        let mut user = Self::default();
        ds.find_object(Self::COLLECTION, single("username", Value::from(username)), &mut user)
            .await?;
        Ok(user)
    }

    /// Load the user with the given email
    pub async fn find_by_email<D: DataStore>(ds: &D, email: &str) -> Result<Self> {
        let mut user = Self::default();
        ds.find_object(Self::COLLECTION, single("email", Value::from(email)), &mut user)
            .await?;
        Ok(user)
    }

    /// Users whose username or email is already taken
    pub async fn count_with_username_or_email<D: DataStore>(
        ds: &D,
        username: &str,
        email: &str,
    ) -> Result<u64> {
        let query = single(
            "$or",
            json!([{ "username": username.trim() }, { "email": email.trim() }]),
        );
        ds.count(Self::COLLECTION, query).await
    }
}

fn validate_password(password: &str) -> Result<()> {
    let trimmed = password.trim();
    if trimmed.is_empty() || trimmed.len() != password.len() {
        return Err(Error::invalid_input("Invalid password"));
    }
    Ok(())
}

// Characters a strict HTML sanitizer would strip or escape
fn has_markup(s: &str) -> bool {
    s.contains(['<', '>', '&', '"', '\''])
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Reverse;

    impl PasswordHasher for Reverse {
        fn hash(&self, password: &str) -> Result<String> {
            Ok(password.chars().rev().collect())
        }

        fn verify(&self, password: &str, hashed: &str) -> bool {
            password.chars().rev().collect::<String>() == hashed
        }
    }

    #[test]
    fn test_from_email() {
        let user = User::from_email(" a@b.co ", " alice ", "secret", "  alice ", &Reverse).unwrap();

        assert_eq!(user.email, "a@b.co");
        assert_eq!(user.username, "alice");
        assert_eq!(user.first_name, "Alice");
        assert!(user.check_password("secret", &Reverse));
        assert!(!user.check_password("other", &Reverse));
        assert_eq!(
            user.base().changes().get(crate::model::UpdateOperator::Set)
                .and_then(|set| set.get("_hashed_password")),
            Some(&json!("terces"))
        );
    }

    #[test]
    fn test_from_email_rejects_bad_input() {
        let invalid = |r: Result<User>| matches!(r, Err(Error::InvalidInput(_)));

        assert!(invalid(User::from_email("nope", "u", "pw", "", &Reverse)));
        assert!(invalid(User::from_email("a@b", "  ", "pw", "", &Reverse)));
        assert!(invalid(User::from_email("a@b", "<b>u</b>", "pw", "", &Reverse)));
        assert!(invalid(User::from_email("a@b", "u", " pw", "", &Reverse)));
        assert!(invalid(User::from_email("a@b", "u", "", "", &Reverse)));
        assert!(invalid(User::from_email("a@b", "u", "pw", "   ", &Reverse)));
        assert!(invalid(User::from_email("a@b", "u", "pw", "Tom & Jerry", &Reverse)));
    }

    #[test]
    fn test_hashed_password_is_stored_not_plain() {
        let user = User::from_email("a@b", "u", "pw", "", &Reverse).unwrap();
        let doc = crate::model::Entity::to_document(&user).unwrap();

        assert_eq!(doc["_hashed_password"], json!("wp"));
        assert!(!doc.contains_key("firstName"));
    }

    #[test]
    fn test_set_custom_field_records_whole_map() {
        let mut user = User::with_id("u1");
        user.set_custom_field("plan", "pro").unwrap();
        user.set_custom_field("seats", 3).unwrap();

        assert_eq!(user.custom_fields["seats"], json!(3));
        let set = user.base().changes().get(crate::model::UpdateOperator::Set).unwrap();
        assert_eq!(set["customFields"], json!({"plan": "pro", "seats": 3}));
    }
}
