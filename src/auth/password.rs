//! Password hashing and verification using Argon2
//!
//! Uses argon2id variant with recommended parameters for password hashing.
//! Only the PHC string is ever stored; the plaintext is dropped after hashing.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash as PhcHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::fmt;

use crate::types::GatehouseError;

/// Password verification material for an account
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash {
    phc: String,
}

impl PasswordHash {
    /// Hash a plaintext password using Argon2id
    pub fn set(plaintext: &str) -> Result<Self, GatehouseError> {
        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| Self {
                phc: hash.to_string(),
            })
            .map_err(|e| GatehouseError::Internal(format!("Failed to hash password: {e}")))
    }

    /// Wrap a PHC string loaded from storage
    pub fn from_phc(phc: String) -> Self {
        Self { phc }
    }

    pub fn as_phc(&self) -> &str {
        &self.phc
    }

    /// Returns true if the plaintext matches the stored hash
    pub fn matches(&self, plaintext: &str) -> Result<bool, GatehouseError> {
        let parsed = PhcHash::new(&self.phc)
            .map_err(|e| GatehouseError::Internal(format!("Invalid password hash format: {e}")))?;

        Ok(Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(..)")
    }
}
