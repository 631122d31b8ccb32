//! Storage capabilities consumed by the pipeline
//!
//! The core never talks to a database directly. It depends on these traits;
//! [`MemoryStore`] backs tests and single-process deployments and
//! [`crate::db::MongoStore`] backs production.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::{Permissions, Scope, TokenRecord, User};
use crate::catalog::Movie;
use crate::types::Result;

/// Accounts, tokens and permission grants
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `DuplicateEmail` if the address is taken
    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn find_user_by_email(&self, email: &str) -> Result<User>;

    /// Owner of the token with `hash` in `scope` whose expiry is after `now`
    async fn find_user_by_token(&self, scope: Scope, hash: &str, now: DateTime<Utc>) -> Result<User>;

    async fn insert_token(&self, token: &TokenRecord) -> Result<()>;

    /// Returns how many tokens were removed
    async fn delete_tokens_for_user(&self, scope: Scope, user_id: Uuid) -> Result<u64>;

    /// Remove tokens whose expiry is at or before `now`
    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn permissions_for_user(&self, user_id: Uuid) -> Result<Permissions>;

    async fn grant_permissions(&self, user_id: Uuid, codes: &[&str]) -> Result<()>;
}

/// Catalog entries. Updates go through [`crate::versioning::VersionedStore`].
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn insert_movie(&self, movie: &Movie) -> Result<()>;

    /// Unconditional delete; `NotFound` if absent
    async fn delete_movie(&self, id: Uuid) -> Result<()>;
}
