// Each test file is compiled as a separate crate, so not every helper is
// used in every file.
#![allow(dead_code)]

use std::sync::Arc;

use rowguard::core::config::StorageConfig;
use rowguard::security::PasswordHasher;
use rowguard::storage::MemoryBackend;
use rowguard::{Acl, CallerIdentity, Database, Store};

/// Database over a fresh in-memory backend, with the backend handle for
/// seeding documents directly
pub fn database() -> (Database, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let db = Database::with_backend(&StorageConfig::default(), backend.clone());
    (db, backend)
}

/// Privileged store
pub fn admin(db: &Database) -> Store {
    db.datastore(None).expect("session")
}

/// Store restricted to `subject` holding `roles`
pub fn caller(db: &Database, subject: &str, roles: &[&str]) -> Store {
    db.datastore(Some(CallerIdentity::new(subject, roles.iter().copied())))
        .expect("session")
}

/// ACL granting read and write to each subject
pub fn owned_by(subjects: &[&str]) -> Acl {
    let mut acl = Acl::new();
    for subject in subjects {
        acl.add_read(*subject);
        acl.add_write(*subject);
    }
    acl
}

/// Reversible stand-in for a real password hash
pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> rowguard::Result<String> {
        Ok(format!("plain:{}", password))
    }

    fn verify(&self, password: &str, hashed: &str) -> bool {
        hashed.strip_prefix("plain:") == Some(password)
    }
}
