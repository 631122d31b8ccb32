//! Optimistic concurrency control for versioned records
//!
//! Writers submit the version they observed. The store applies the write only
//! if the stored version still matches, bumping it by one in the same
//! statement; otherwise the write is rejected with `EditConflict` and nothing
//! is merged.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::{GatehouseError, Result};

/// A record carrying a monotonically increasing version counter
pub trait Versioned: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
}

/// Storage capability needed by [`VersionedUpdater`]
#[async_trait]
pub trait VersionedStore<T: Versioned>: Send + Sync {
    /// Fetch the current committed record
    async fn get(&self, id: Uuid) -> Result<T>;

    /// Persist `item` iff the stored version equals `expected_version`,
    /// incrementing the version atomically. Returns the new version.
    ///
    /// Fails with `EditConflict` when the record exists at another version and
    /// `NotFound` when it no longer exists.
    async fn conditional_update(&self, item: &T, expected_version: i64) -> Result<i64>;
}

/// Applies mutations to versioned records through a single conditional write
pub struct VersionedUpdater<T: Versioned> {
    store: Arc<dyn VersionedStore<T>>,
}

impl<T: Versioned> Clone for VersionedUpdater<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<T: Versioned> VersionedUpdater<T> {
    pub fn new(store: Arc<dyn VersionedStore<T>>) -> Self {
        Self { store }
    }

    /// Read `id`, apply `mutator`, and commit against `expected_version`.
    ///
    /// A record already past `expected_version` is rejected before the
    /// mutator runs. The commit itself is the store's conditional update, so
    /// a writer that sneaks in between the read and the commit still causes
    /// `EditConflict` here rather than a lost update.
    pub async fn apply<F>(&self, id: Uuid, expected_version: i64, mutator: F) -> Result<T>
    where
        F: FnOnce(&mut T) -> Result<()> + Send,
    {
        let mut item = self.store.get(id).await?;

        if item.version() != expected_version {
            debug!(
                %id,
                expected_version,
                stored_version = item.version(),
                "Stale version observed"
            );
            return Err(GatehouseError::EditConflict);
        }

        mutator(&mut item)?;

        match self.store.conditional_update(&item, expected_version).await {
            Ok(new_version) => {
                item.set_version(new_version);
                Ok(item)
            }
            Err(GatehouseError::EditConflict) => {
                warn!(%id, expected_version, "Edit conflict on commit");
                Err(GatehouseError::EditConflict)
            }
            Err(e) => Err(e),
        }
    }
}
