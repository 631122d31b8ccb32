//! Opaque bearer tokens
//!
//! A token is 16 random bytes, base64url encoded without padding (22 chars).
//! The plaintext goes to the client once; storage only ever sees its SHA-256
//! hash. Tokens carry a [`Scope`] so an activation token can never be used as
//! an API credential.

use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::auth::principal::User;
use crate::clock::SharedClock;
use crate::store::CredentialStore;
use crate::types::{GatehouseError, Result};
use crate::validation::Validator;

/// Random bytes per token
const TOKEN_BYTES: usize = 16;

/// Encoded plaintext length
pub const TOKEN_PLAINTEXT_LEN: usize = 22;

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Authentication,
    Activation,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Authentication => "authentication",
            Scope::Activation => "activation",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored form of a token. The plaintext is not part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    /// Hex encoded SHA-256 of the plaintext
    pub hash: String,
    pub user_id: Uuid,
    pub scope: Scope,
    pub expiry: DateTime<Utc>,
}

/// Freshly minted token, returned to the caller exactly once
#[derive(Debug, Clone, Serialize)]
pub struct AuthToken {
    #[serde(rename = "token")]
    pub plaintext: String,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub record: TokenRecord,
}

/// Hash a plaintext token for storage or lookup
pub fn hash_plaintext(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_plaintext() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Shape check run before any hashing or storage lookup
pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == TOKEN_PLAINTEXT_LEN,
        "token",
        "must be 22 characters long",
    );
    v.check(
        plaintext
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'),
        "token",
        "must only contain URL-safe base64 characters",
    );
}

/// Issues, validates and revokes scoped tokens against the credential store
#[derive(Clone)]
pub struct TokenVault {
    store: Arc<dyn CredentialStore>,
    clock: SharedClock,
}

impl TokenVault {
    pub fn new(store: Arc<dyn CredentialStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Mint and persist a token for `user_id`; the plaintext is unrecoverable afterwards
    pub async fn issue(&self, user_id: Uuid, ttl: Duration, scope: Scope) -> Result<AuthToken> {
        let expiry = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .ok_or_else(|| GatehouseError::Internal(format!("token ttl {ttl} out of range")))?;

        let plaintext = generate_plaintext();
        let record = TokenRecord {
            hash: hash_plaintext(&plaintext),
            user_id,
            scope,
            expiry,
        };

        self.store.insert_token(&record).await?;
        debug!(user_id = %user_id, scope = %scope, expiry = %record.expiry, "Token issued");

        Ok(AuthToken {
            plaintext,
            expiry: record.expiry,
            record,
        })
    }

    /// Resolve the owner of an unexpired `scope` token.
    ///
    /// Malformed plaintext fails with `Validation` without touching storage.
    /// Unknown, expired and wrong-scope tokens all fail with `NotFound`.
    pub async fn validate(&self, scope: Scope, plaintext: &str) -> Result<User> {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, plaintext);
        v.into_result()?;

        let hash = hash_plaintext(plaintext);
        self.store
            .find_user_by_token(scope, &hash, self.clock.now())
            .await
    }

    /// Delete every `scope` token owned by `user_id`. Idempotent.
    pub async fn revoke_all(&self, scope: Scope, user_id: Uuid) -> Result<()> {
        let removed = self.store.delete_tokens_for_user(scope, user_id).await?;
        debug!(user_id = %user_id, scope = %scope, removed, "Tokens revoked");
        Ok(())
    }
}
