//! Authentication and authorization for Gatehouse
//!
//! Provides:
//! - Principals (anonymous sentinel or registered user)
//! - Scoped opaque bearer tokens, stored only as hashes
//! - Bearer header resolution
//! - Permission codes and the authorization gate
//! - Password hashing with Argon2

pub mod password;
pub mod permissions;
pub mod principal;
pub mod resolver;
pub mod token;

pub use password::PasswordHash;
pub use permissions::{PermissionGate, Permissions, DEFAULT_PERMISSIONS, MOVIES_READ, MOVIES_WRITE};
pub use principal::{Principal, User};
pub use resolver::{extract_bearer_token, PrincipalResolver};
pub use token::{hash_plaintext, AuthToken, Scope, TokenRecord, TokenVault};
