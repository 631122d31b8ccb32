//! Maps the `Authorization` header of a request to a [`Principal`]

use tracing::error;

use crate::auth::principal::Principal;
use crate::auth::token::{Scope, TokenVault};
use crate::types::{GatehouseError, Result};

/// Extract the token from a `Bearer <token>` header value.
///
/// Anything other than exactly two space separated parts with the `Bearer`
/// scheme is malformed.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

#[derive(Clone)]
pub struct PrincipalResolver {
    vault: TokenVault,
}

impl PrincipalResolver {
    pub fn new(vault: TokenVault) -> Self {
        Self { vault }
    }

    /// Resolve the caller.
    ///
    /// - no header: `Principal::Anonymous`
    /// - malformed, unknown or expired token: `Authentication`, with no hint as to which
    /// - storage fault: `Internal`, logged here
    pub async fn resolve(&self, header: Option<&str>) -> Result<Principal> {
        let Some(header) = header.filter(|h| !h.is_empty()) else {
            return Ok(Principal::Anonymous);
        };

        let token = extract_bearer_token(header).ok_or(GatehouseError::Authentication)?;

        match self.vault.validate(Scope::Authentication, token).await {
            Ok(user) => Ok(Principal::Authenticated(user)),
            Err(GatehouseError::Validation(_)) | Err(GatehouseError::NotFound) => {
                Err(GatehouseError::Authentication)
            }
            Err(e) => {
                error!(error = %e, "Token lookup failed");
                Err(GatehouseError::Internal(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::PasswordHash;
    use crate::auth::principal::User;
    use crate::clock::{Clock, ManualClock};
    use crate::store::{CredentialStore, MemoryStore};
    use chrono::Duration;
    use std::sync::Arc;

    async fn setup() -> (PrincipalResolver, TokenVault, Arc<MemoryStore>, ManualClock, User) {
        let clock = ManualClock::default();
        let store = Arc::new(MemoryStore::new());
        let user = User::new(
            "Bob Jones".into(),
            "bob@example.com".into(),
            PasswordHash::from_phc("$argon2id$stub".into()),
            clock.now(),
        );
        store.insert_user(&user).await.unwrap();
        let vault = TokenVault::new(store.clone(), Arc::new(clock.clone()));
        (PrincipalResolver::new(vault.clone()), vault, store, clock, user)
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("Basic abc123"), None);
        assert_eq!(extract_bearer_token("abc123"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Bearer a b"), None);
        assert_eq!(extract_bearer_token("bearer abc123"), None);
    }

    #[tokio::test]
    async fn test_missing_header_is_anonymous() {
        let (resolver, ..) = setup().await;
        assert!(resolver.resolve(None).await.unwrap().is_anonymous());
        assert!(resolver.resolve(Some("")).await.unwrap().is_anonymous());
    }

    #[tokio::test]
    async fn test_valid_token_resolves_user() {
        let (resolver, vault, _store, _clock, user) = setup().await;
        let token = vault
            .issue(user.id, Duration::hours(24), Scope::Authentication)
            .await
            .unwrap();

        let header = format!("Bearer {}", token.plaintext);
        let principal = resolver.resolve(Some(&header)).await.unwrap();
        assert_eq!(principal.id(), Some(user.id));
    }

    #[tokio::test]
    async fn test_failures_are_indistinguishable() {
        let (resolver, vault, _store, clock, user) = setup().await;
        let expired = vault
            .issue(user.id, Duration::minutes(5), Scope::Authentication)
            .await
            .unwrap();
        let activation = vault
            .issue(user.id, Duration::days(3), Scope::Activation)
            .await
            .unwrap();
        clock.advance(Duration::minutes(10));

        let headers = [
            "Token abc".to_string(),
            "Bearer short".to_string(),
            format!("Bearer {}", "A".repeat(22)),
            format!("Bearer {}", expired.plaintext),
            format!("Bearer {}", activation.plaintext),
        ];
        for header in headers {
            assert_eq!(
                resolver.resolve(Some(&header)).await.unwrap_err(),
                GatehouseError::Authentication,
                "header {header:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_storage_fault_is_internal() {
        let (resolver, _vault, store, _clock, _user) = setup().await;
        store.fail_with(GatehouseError::Storage("timeout".into()));

        let header = format!("Bearer {}", "A".repeat(22));
        assert!(matches!(
            resolver.resolve(Some(&header)).await,
            Err(GatehouseError::Internal(_))
        ));
    }
}
