//! Who a request acts as
//!
//! A request without credentials still resolves to a [`Principal`]: the
//! `Anonymous` variant. Downstream stages match on the enum instead of
//! checking for a missing user.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::password::PasswordHash;
use crate::versioning::Versioned;

/// Registered account.
///
/// Granted permission codes live in the credential store and are read by
/// [`crate::auth::PermissionGate`] at check time.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: PasswordHash,
    pub activated: bool,
    /// Bumped by every committed update
    #[serde(skip)]
    pub version: i64,
}

impl User {
    /// New, not yet persisted or activated account
    pub fn new(name: String, email: String, password: PasswordHash, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            name,
            email,
            password,
            activated: false,
            version: 1,
        }
    }
}

impl Versioned for User {
    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

/// Resolved identity of a request
#[derive(Debug, Clone, Default)]
pub enum Principal {
    /// No credential presented. Never persisted, never activated, holds no permissions.
    #[default]
    Anonymous,
    Authenticated(User),
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::Anonymous => None,
            Principal::Authenticated(user) => Some(user),
        }
    }

    pub fn id(&self) -> Option<Uuid> {
        self.user().map(|u| u.id)
    }

    pub fn is_activated(&self) -> bool {
        self.user().is_some_and(|u| u.activated)
    }
}

impl From<User> for Principal {
    fn from(user: User) -> Self {
        Principal::Authenticated(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_is_never_activated() {
        let anon = Principal::Anonymous;
        assert!(anon.is_anonymous());
        assert!(!anon.is_activated());
        assert!(anon.id().is_none());
        assert!(Principal::default().is_anonymous());
    }

    #[test]
    fn test_user_serialization_hides_secrets() {
        let user = User::new(
            "Alice Smith".into(),
            "alice@example.com".into(),
            PasswordHash::from_phc("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into()),
            Utc::now(),
        );
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["email"], "alice@example.com");
        assert_eq!(json["activated"], false);
        assert!(json.get("password").is_none());
        assert!(json.get("version").is_none());
    }
}
