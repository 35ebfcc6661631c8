//! Password hashing seam
//!
//! The crate never hashes passwords itself. Applications plug in a one-way
//! hash (bcrypt, argon2, ...) by implementing [`PasswordHasher`].

use crate::core::Result;

/// Opaque one-way password hash and verify function
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password for storage
    fn hash(&self, password: &str) -> Result<String>;

    /// Check a plaintext password against a stored hash
    fn verify(&self, password: &str, hashed: &str) -> bool;
}
