//! Permission codes and the authorization gate
//!
//! Checks run in a fixed order and each failure keeps its own kind:
//! anonymous -> `AuthenticationRequired`, not activated -> `InactiveAccount`,
//! missing code -> `NotPermitted`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::auth::principal::{Principal, User};
use crate::store::CredentialStore;
use crate::types::{GatehouseError, Result};

/// Read access to the catalog
pub const MOVIES_READ: &str = "movies:read";

/// Create, update and delete catalog entries
pub const MOVIES_WRITE: &str = "movies:write";

/// Granted to every newly registered account
pub const DEFAULT_PERMISSIONS: &[&str] = &[MOVIES_READ];

/// Set of permission codes held by an account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn insert(&mut self, code: impl Into<String>) -> bool {
        self.0.insert(code.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Authorizes a resolved principal against a required permission code
#[derive(Clone)]
pub struct PermissionGate {
    store: Arc<dyn CredentialStore>,
}

impl PermissionGate {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Anonymous principals fail with `AuthenticationRequired`
    pub fn require_authenticated(principal: &Principal) -> Result<&User> {
        principal.user().ok_or(GatehouseError::AuthenticationRequired)
    }

    /// Authenticated, activated principal
    pub fn require_activated(principal: &Principal) -> Result<&User> {
        let user = Self::require_authenticated(principal)?;
        if !user.activated {
            return Err(GatehouseError::InactiveAccount);
        }
        Ok(user)
    }

    /// Allow iff the principal is activated and holds `code`.
    ///
    /// A storage failure during the permission lookup is returned as-is and
    /// no permission decision is made.
    pub async fn authorize(&self, principal: &Principal, code: &str) -> Result<()> {
        let user = Self::require_activated(principal)?;

        let permissions = self.store.permissions_for_user(user.id).await?;
        if !permissions.include(code) {
            debug!(user_id = %user.id, code, "Permission denied");
            return Err(GatehouseError::NotPermitted);
        }

        Ok(())
    }
}
