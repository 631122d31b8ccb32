//! In-process store
//!
//! All collections sit behind one `RwLock`, so every conditional update is a
//! single critical section: the version comparison and the write cannot be
//! separated by another writer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CredentialStore, ResourceStore};
use crate::auth::{Permissions, Scope, TokenRecord, User};
use crate::catalog::Movie;
use crate::types::{GatehouseError, Result};
use crate::versioning::VersionedStore;

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    /// Keyed by token hash
    tokens: HashMap<String, TokenRecord>,
    permissions: HashMap<Uuid, Permissions>,
    movies: HashMap<Uuid, Movie>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    /// Injected fault returned by every operation while set
    fault: Mutex<Option<GatehouseError>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `err`
    pub fn fail_with(&self, err: GatehouseError) {
        *self.fault.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
    }

    pub fn clear_fault(&self) {
        *self.fault.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn check_fault(&self) -> Result<()> {
        match self.fault.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub async fn token_count(&self) -> usize {
        self.inner.read().await.tokens.len()
    }

    #[cfg(test)]
    pub(crate) async fn token_hashes(&self) -> Vec<String> {
        self.inner.read().await.tokens.keys().cloned().collect()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        self.check_fault()?;
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(GatehouseError::DuplicateEmail);
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<User> {
        self.check_fault()?;
        let inner = self.inner.read().await;
        inner
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(GatehouseError::NotFound)
    }

    async fn find_user_by_token(&self, scope: Scope, hash: &str, now: DateTime<Utc>) -> Result<User> {
        self.check_fault()?;
        let inner = self.inner.read().await;
        inner
            .tokens
            .get(hash)
            .filter(|t| t.scope == scope && t.expiry > now)
            .and_then(|t| inner.users.get(&t.user_id))
            .cloned()
            .ok_or(GatehouseError::NotFound)
    }

    async fn insert_token(&self, token: &TokenRecord) -> Result<()> {
        self.check_fault()?;
        let mut inner = self.inner.write().await;
        inner.tokens.insert(token.hash.clone(), token.clone());
        Ok(())
    }

    async fn delete_tokens_for_user(&self, scope: Scope, user_id: Uuid) -> Result<u64> {
        self.check_fault()?;
        let mut inner = self.inner.write().await;
        let before = inner.tokens.len();
        inner
            .tokens
            .retain(|_, t| !(t.scope == scope && t.user_id == user_id));
        Ok((before - inner.tokens.len()) as u64)
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        self.check_fault()?;
        let mut inner = self.inner.write().await;
        let before = inner.tokens.len();
        inner.tokens.retain(|_, t| t.expiry > now);
        Ok((before - inner.tokens.len()) as u64)
    }

    async fn permissions_for_user(&self, user_id: Uuid) -> Result<Permissions> {
        self.check_fault()?;
        let inner = self.inner.read().await;
        Ok(inner.permissions.get(&user_id).cloned().unwrap_or_default())
    }

    async fn grant_permissions(&self, user_id: Uuid, codes: &[&str]) -> Result<()> {
        self.check_fault()?;
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&user_id) {
            return Err(GatehouseError::NotFound);
        }
        let granted = inner.permissions.entry(user_id).or_default();
        for code in codes {
            granted.insert(*code);
        }
        Ok(())
    }
}

#[async_trait]
impl VersionedStore<User> for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<User> {
        self.check_fault()?;
        let inner = self.inner.read().await;
        inner.users.get(&id).cloned().ok_or(GatehouseError::NotFound)
    }

    async fn conditional_update(&self, user: &User, expected_version: i64) -> Result<i64> {
        self.check_fault()?;
        let mut inner = self.inner.write().await;

        if inner
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(GatehouseError::DuplicateEmail);
        }

        let stored = inner.users.get_mut(&user.id).ok_or(GatehouseError::NotFound)?;
        if stored.version != expected_version {
            return Err(GatehouseError::EditConflict);
        }

        let mut updated = user.clone();
        updated.version = expected_version + 1;
        *stored = updated;
        Ok(expected_version + 1)
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn insert_movie(&self, movie: &Movie) -> Result<()> {
        self.check_fault()?;
        let mut inner = self.inner.write().await;
        inner.movies.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn delete_movie(&self, id: Uuid) -> Result<()> {
        self.check_fault()?;
        let mut inner = self.inner.write().await;
        inner
            .movies
            .remove(&id)
            .map(|_| ())
            .ok_or(GatehouseError::NotFound)
    }
}

#[async_trait]
impl VersionedStore<Movie> for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Movie> {
        self.check_fault()?;
        let inner = self.inner.read().await;
        inner.movies.get(&id).cloned().ok_or(GatehouseError::NotFound)
    }

    async fn conditional_update(&self, movie: &Movie, expected_version: i64) -> Result<i64> {
        self.check_fault()?;
        let mut inner = self.inner.write().await;

        let stored = inner.movies.get_mut(&movie.id).ok_or(GatehouseError::NotFound)?;
        if stored.version != expected_version {
            return Err(GatehouseError::EditConflict);
        }

        let mut updated = movie.clone();
        updated.version = expected_version + 1;
        *stored = updated;
        Ok(expected_version + 1)
    }
}
