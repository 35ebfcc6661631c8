//! Access control primitives
//!
//! Permission sets stored on every document, the caller identity they are
//! checked against, and the password hashing seam.

pub mod acl;
pub mod identity;
pub mod password;

// Re-export commonly used types
pub use acl::{Acl, Permission, PUBLIC_KEY};
pub use identity::CallerIdentity;
pub use password::PasswordHasher;
