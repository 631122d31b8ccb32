//! Request pipeline facade
//!
//! [`Gatehouse`] wires the limiter, resolver, gate and versioned updater to
//! one store and exposes the four pipeline stages plus the catalog operations
//! built on them. Stages fail fast: a caller that gets an error from one stage
//! must not run the next.

use chrono::Utc;
use std::future::{self, Future};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::accounts::{Accounts, ActivationMailer, TokenTtls};
use crate::auth::{
    PermissionGate, Principal, PrincipalResolver, TokenVault, User, MOVIES_READ, MOVIES_WRITE,
};
use crate::catalog::{check_movie, Movie, MovieInput, MoviePatch};
use crate::clock::SharedClock;
use crate::limiter::{LimiterConfig, RateLimiterRegistry};
use crate::store::{CredentialStore, ResourceStore};
use crate::types::Result;
use crate::versioning::{VersionedStore, VersionedUpdater};

/// How often expired tokens are purged from storage
pub const TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone)]
pub struct Gatehouse {
    limiter: Arc<RateLimiterRegistry>,
    resolver: PrincipalResolver,
    gate: PermissionGate,
    movies: VersionedUpdater<Movie>,
    movie_reader: Arc<dyn VersionedStore<Movie>>,
    resources: Arc<dyn ResourceStore>,
    credentials: Arc<dyn CredentialStore>,
    accounts: Accounts,
    clock: SharedClock,
}

impl Gatehouse {
    /// Build the pipeline over a store that backs every capability
    pub fn new<S>(
        store: Arc<S>,
        limiter: LimiterConfig,
        mailer: Arc<dyn ActivationMailer>,
        clock: SharedClock,
        ttls: TokenTtls,
    ) -> Self
    where
        S: CredentialStore + ResourceStore + VersionedStore<User> + VersionedStore<Movie> + 'static,
    {
        let credentials: Arc<dyn CredentialStore> = store.clone();
        let resources: Arc<dyn ResourceStore> = store.clone();
        let users: Arc<dyn VersionedStore<User>> = store.clone();
        let movie_reader: Arc<dyn VersionedStore<Movie>> = store;

        let vault = TokenVault::new(Arc::clone(&credentials), Arc::clone(&clock));

        Self {
            limiter: Arc::new(RateLimiterRegistry::new(limiter, Arc::clone(&clock))),
            resolver: PrincipalResolver::new(vault),
            gate: PermissionGate::new(Arc::clone(&credentials)),
            movies: VersionedUpdater::new(Arc::clone(&movie_reader)),
            movie_reader,
            resources,
            accounts: Accounts::new(
                Arc::clone(&credentials),
                users,
                mailer,
                Arc::clone(&clock),
                ttls,
            ),
            credentials,
            clock,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiterRegistry> {
        &self.limiter
    }

    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    /// Stage 1: per-client admission
    pub fn admit_request(&self, client_id: &str) -> Result<()> {
        self.limiter.admit(client_id)
    }

    /// Stage 2: map the `Authorization` header to a principal
    pub async fn resolve_principal(&self, header: Option<&str>) -> Result<Principal> {
        self.resolver.resolve(header).await
    }

    /// Stage 3: permission check
    pub async fn authorize(&self, principal: &Principal, code: &str) -> Result<()> {
        self.gate.authorize(principal, code).await
    }

    /// Stage 4: mutate a movie under optimistic concurrency
    pub async fn apply_versioned_update<F>(
        &self,
        id: Uuid,
        expected_version: i64,
        mutator: F,
    ) -> Result<Movie>
    where
        F: FnOnce(&mut Movie) -> Result<()> + Send,
    {
        self.movies.apply(id, expected_version, mutator).await
    }

    pub async fn create_movie(&self, principal: &Principal, input: MovieInput) -> Result<Movie> {
        self.create_movie_with(principal, future::ready(Ok(input))).await
    }

    /// Create a movie from input that is only read once the principal may write.
    ///
    /// A caller that fails the gate never has its request body parsed.
    pub async fn create_movie_with<I>(&self, principal: &Principal, input: I) -> Result<Movie>
    where
        I: Future<Output = Result<MovieInput>> + Send,
    {
        self.authorize(principal, MOVIES_WRITE).await?;
        let input = input.await?;

        let now = self.clock.now();
        let movie = Movie::new(input.title, input.year, input.runtime, input.genres, now);
        check_movie(&movie, now)?;

        self.resources.insert_movie(&movie).await?;
        info!(movie_id = %movie.id, "Created movie");
        Ok(movie)
    }

    pub async fn show_movie(&self, principal: &Principal, id: Uuid) -> Result<Movie> {
        self.authorize(principal, MOVIES_READ).await?;
        self.movie_reader.get(id).await
    }

    /// Partial update. Without `expected_version` the version read now is used.
    pub async fn update_movie(
        &self,
        principal: &Principal,
        id: Uuid,
        expected_version: Option<i64>,
        patch: MoviePatch,
    ) -> Result<Movie> {
        self.update_movie_with(principal, id, future::ready(Ok((expected_version, patch))))
            .await
    }

    /// Like [`Gatehouse::update_movie`], with the pinned version and patch
    /// read only after the gate has passed
    pub async fn update_movie_with<R>(
        &self,
        principal: &Principal,
        id: Uuid,
        request: R,
    ) -> Result<Movie>
    where
        R: Future<Output = Result<(Option<i64>, MoviePatch)>> + Send,
    {
        self.authorize(principal, MOVIES_WRITE).await?;
        let (expected_version, patch) = request.await?;

        let expected_version = match expected_version {
            Some(version) => version,
            None => self.movie_reader.get(id).await?.version,
        };

        let now = self.clock.now();
        self.apply_versioned_update(id, expected_version, move |movie| {
            movie.apply_patch(patch);
            check_movie(movie, now)
        })
        .await
    }

    /// Unconditional delete
    pub async fn delete_movie(&self, principal: &Principal, id: Uuid) -> Result<()> {
        self.authorize(principal, MOVIES_WRITE).await?;
        self.resources.delete_movie(id).await?;
        info!(movie_id = %id, "Deleted movie");
        Ok(())
    }

    /// Remove expired tokens. Returns how many were removed.
    pub async fn purge_expired_tokens(&self) -> Result<u64> {
        self.credentials.delete_expired_tokens(self.clock.now()).await
    }
}

/// Spawn periodic purging of expired tokens.
///
/// A failed purge is logged and retried on the next tick.
pub fn spawn_token_purge_task(gatehouse: Arc<Gatehouse>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match gatehouse.purge_expired_tokens().await {
                Ok(removed) => debug!(removed, at = %Utc::now(), "Expired token purge complete"),
                Err(e) => warn!(error = %e, "Expired token purge failed"),
            }
        }
    });
    info!(interval_secs = interval.as_secs(), "Token purge task started");
}
