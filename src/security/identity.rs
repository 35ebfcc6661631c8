//! Caller identity supplied by the authentication layer

use crate::entities::{Role, User};
use crate::model::Model;
use crate::security::acl::{role_key, PUBLIC_KEY};

/// Authenticated caller: a subject id plus the names of its granted roles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    /// User id of the caller
    pub subject: String,
    /// Names of roles granted to the caller
    pub roles: Vec<String>,
}

impl CallerIdentity {
    /// Create an identity from a subject id and role names
    pub fn new(subject: impl Into<String>, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            subject: subject.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Identity of a loaded user and the roles found for it
    pub fn from_user(user: &User, roles: &[Role]) -> Self {
        Self {
            subject: user.base().id().to_string(),
            roles: roles.iter().map(|r| r.name.clone()).collect(),
        }
    }

    /// Subject keys this caller matches in an ACL: its id, the public
    /// wildcard, then `role:<name>` for each role
    pub fn access_set(&self) -> Vec<String> {
        let mut access = Vec::with_capacity(self.roles.len() + 2);
        access.push(self.subject.clone());
        access.push(PUBLIC_KEY.to_string());
        access.extend(self.roles.iter().map(|name| role_key(name)));
        access
    }
}
