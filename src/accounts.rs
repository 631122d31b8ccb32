//! Account lifecycle: registration, activation and login
//!
//! Registration leaves the account unactivated and mails out an
//! activation-scope token. Activating flips the flag through the versioned
//! updater and burns every outstanding activation token for the account.

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::{AuthToken, PasswordHash, Scope, TokenVault, User, DEFAULT_PERMISSIONS};
use crate::clock::SharedClock;
use crate::store::CredentialStore;
use crate::types::{GatehouseError, Result};
use crate::validation::{validate_email, validate_name, validate_password_plaintext, Validator};
use crate::versioning::{VersionedStore, VersionedUpdater};

/// Delivers activation tokens to new users
#[async_trait]
pub trait ActivationMailer: Send + Sync {
    async fn send_activation(&self, user: &User, token: &AuthToken) -> Result<()>;
}

/// Development mailer: writes the activation token to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMailer;

#[async_trait]
impl ActivationMailer for TracingMailer {
    async fn send_activation(&self, user: &User, token: &AuthToken) -> Result<()> {
        info!(
            user_id = %user.id,
            email = %user.email,
            activation_token = %token.plaintext,
            expiry = %token.expiry,
            "Activation token issued"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Token lifetimes
#[derive(Debug, Clone, Copy)]
pub struct TokenTtls {
    pub authentication: Duration,
    pub activation: Duration,
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self {
            authentication: Duration::hours(24),
            activation: Duration::hours(72),
        }
    }
}

#[derive(Clone)]
pub struct Accounts {
    store: Arc<dyn CredentialStore>,
    users: VersionedUpdater<User>,
    vault: TokenVault,
    mailer: Arc<dyn ActivationMailer>,
    clock: SharedClock,
    ttls: TokenTtls,
}

impl Accounts {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        users: Arc<dyn VersionedStore<User>>,
        mailer: Arc<dyn ActivationMailer>,
        clock: SharedClock,
        ttls: TokenTtls,
    ) -> Self {
        Self {
            vault: TokenVault::new(Arc::clone(&store), Arc::clone(&clock)),
            users: VersionedUpdater::new(users),
            store,
            mailer,
            clock,
            ttls,
        }
    }

    /// Create an unactivated account and send its activation token
    pub async fn register(&self, req: RegisterRequest) -> Result<User> {
        let mut v = Validator::new();
        validate_name(&mut v, &req.name);
        validate_email(&mut v, &req.email);
        validate_password_plaintext(&mut v, &req.password);
        v.into_result()?;

        let password = PasswordHash::set(&req.password)?;
        let user = User::new(req.name, req.email, password, self.clock.now());

        match self.store.insert_user(&user).await {
            Ok(()) => {}
            Err(GatehouseError::DuplicateEmail) => {
                return Err(GatehouseError::field(
                    "email",
                    "a user with this email address already exists",
                ))
            }
            Err(e) => return Err(e),
        }

        self.store
            .grant_permissions(user.id, DEFAULT_PERMISSIONS)
            .await?;

        let token = self
            .vault
            .issue(user.id, self.ttls.activation, Scope::Activation)
            .await?;

        // Delivery happens off the request path; failures only reach the log
        let mailer = Arc::clone(&self.mailer);
        let recipient = user.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send_activation(&recipient, &token).await {
                error!(user_id = %recipient.id, error = %e, "Failed to send activation token");
            }
        });

        info!(user_id = %user.id, "Registered new user");
        Ok(user)
    }

    /// Activate the owner of an activation token
    pub async fn activate(&self, req: ActivateRequest) -> Result<User> {
        let owner = match self.vault.validate(Scope::Activation, &req.token).await {
            Ok(user) => user,
            Err(GatehouseError::NotFound) => {
                return Err(GatehouseError::field(
                    "token",
                    "invalid or expired activation token",
                ))
            }
            Err(e) => return Err(e),
        };

        let user = self
            .users
            .apply(owner.id, owner.version, |user| {
                user.activated = true;
                Ok(())
            })
            .await?;

        self.vault.revoke_all(Scope::Activation, user.id).await?;

        info!(user_id = %user.id, "Activated user");
        Ok(user)
    }

    /// Exchange credentials for an authentication token
    pub async fn login(&self, req: LoginRequest) -> Result<AuthToken> {
        let mut v = Validator::new();
        validate_email(&mut v, &req.email);
        validate_password_plaintext(&mut v, &req.password);
        v.into_result()?;

        let user = match self.store.find_user_by_email(&req.email).await {
            Ok(user) => user,
            Err(GatehouseError::NotFound) => return Err(GatehouseError::InvalidCredentials),
            Err(e) => return Err(e),
        };

        if !user.password.matches(&req.password)? {
            warn!(user_id = %user.id, "Login with wrong password");
            return Err(GatehouseError::InvalidCredentials);
        }

        self.vault
            .issue(user.id, self.ttls.authentication, Scope::Authentication)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    struct ChannelMailer(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl ActivationMailer for ChannelMailer {
        async fn send_activation(&self, _user: &User, token: &AuthToken) -> Result<()> {
            self.0
                .send(token.plaintext.clone())
                .map_err(|e| GatehouseError::Internal(e.to_string()))
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl ActivationMailer for FailingMailer {
        async fn send_activation(&self, _user: &User, _token: &AuthToken) -> Result<()> {
            Err(GatehouseError::Internal("smtp unreachable".into()))
        }
    }

    fn accounts(
        mailer: Arc<dyn ActivationMailer>,
    ) -> (Accounts, Arc<MemoryStore>, ManualClock) {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::default();
        let accounts = Accounts::new(
            store.clone(),
            store.clone(),
            mailer,
            Arc::new(clock.clone()),
            TokenTtls::default(),
        );
        (accounts, store, clock)
    }

    fn alice() -> RegisterRequest {
        RegisterRequest {
            name: "Alice Smith".into(),
            email: "alice@example.com".into(),
            password: "pa55word".into(),
        }
    }

    #[tokio::test]
    async fn test_register_activate_login() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (accounts, store, _clock) = accounts(Arc::new(ChannelMailer(tx)));

        let user = assert_ok!(accounts.register(alice()).await);
        assert!(!user.activated);
        assert_eq!(user.version, 1);
        assert!(store.permissions_for_user(user.id).await.unwrap().include("movies:read"));

        let token = rx.recv().await.unwrap();
        let activated = assert_ok!(accounts.activate(ActivateRequest { token: token.clone() }).await);
        assert!(activated.activated);
        assert_eq!(activated.version, 2);

        // Activation tokens are single use
        let err = assert_err!(accounts.activate(ActivateRequest { token }).await);
        assert_eq!(
            err,
            GatehouseError::field("token", "invalid or expired activation token")
        );

        let auth = assert_ok!(
            accounts
                .login(LoginRequest {
                    email: "alice@example.com".into(),
                    password: "pa55word".into(),
                })
                .await
        );
        assert_eq!(auth.record.scope, Scope::Authentication);
        assert_eq!(auth.plaintext.len(), 22);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_field_error() {
        let (accounts, _store, _clock) = accounts(Arc::new(TracingMailer));
        assert_ok!(accounts.register(alice()).await);
        assert_eq!(
            accounts.register(alice()).await.unwrap_err(),
            GatehouseError::field("email", "a user with this email address already exists")
        );
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (accounts, _store, _clock) = accounts(Arc::new(TracingMailer));
        let err = accounts
            .register(RegisterRequest {
                name: String::new(),
                email: "not-an-email".into(),
                password: "short".into(),
            })
            .await
            .unwrap_err();

        let GatehouseError::Validation(fields) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(fields["name"], "must be provided");
        assert_eq!(fields["email"], "must be a valid email address");
        assert_eq!(fields["password"], "must be at least 8 bytes long");
    }

    #[tokio::test]
    async fn test_mailer_failure_does_not_fail_registration() {
        let (accounts, store, _clock) = accounts(Arc::new(FailingMailer));
        assert_ok!(accounts.register(alice()).await);
        assert_eq!(store.token_count().await, 1);
    }

    #[tokio::test]
    async fn test_expired_activation_token() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (accounts, _store, clock) = accounts(Arc::new(ChannelMailer(tx)));
        accounts.register(alice()).await.unwrap();
        let token = rx.recv().await.unwrap();

        clock.advance(Duration::hours(73));
        assert_eq!(
            accounts.activate(ActivateRequest { token }).await.unwrap_err(),
            GatehouseError::field("token", "invalid or expired activation token")
        );
    }

    #[tokio::test]
    async fn test_malformed_activation_token() {
        let (accounts, _store, _clock) = accounts(Arc::new(TracingMailer));
        let err = accounts
            .activate(ActivateRequest { token: "abc".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, GatehouseError::Validation(ref f) if f.contains_key("token")));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (accounts, _store, _clock) = accounts(Arc::new(TracingMailer));
        accounts.register(alice()).await.unwrap();

        let wrong_password = accounts
            .login(LoginRequest {
                email: "alice@example.com".into(),
                password: "wrongpass".into(),
            })
            .await
            .unwrap_err();
        let unknown_email = accounts
            .login(LoginRequest {
                email: "bob@example.com".into(),
                password: "pa55word".into(),
            })
            .await
            .unwrap_err();

        assert_eq!(wrong_password, GatehouseError::InvalidCredentials);
        assert_eq!(unknown_email, GatehouseError::InvalidCredentials);
    }
}
