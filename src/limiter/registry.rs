//! Per-client rate limiter registry
//!
//! One token bucket per client identity, created lazily and dropped by a
//! background sweep once the client has been quiet for [`STALE_AFTER`].
//! The map sits behind a single mutex shared by admission and the sweep; the
//! lock is never held across an await.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::bucket::TokenBucket;
use crate::clock::SharedClock;
use crate::types::{GatehouseError, Result};

/// How often the sweep runs
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Entries unseen for longer than this are removed by the sweep
pub const STALE_AFTER: Duration = Duration::from_secs(3 * 60);

/// Limiter configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterConfig {
    /// Admit everything when false
    pub enabled: bool,
    /// Sustained requests per second per client
    pub rps: f64,
    /// Bucket capacity
    pub burst: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: 2.0,
            burst: 4,
        }
    }
}

#[derive(Debug)]
struct ClientEntry {
    bucket: TokenBucket,
    last_seen: DateTime<Utc>,
}

/// Statistics about the registry
#[derive(Debug, Clone)]
pub struct LimiterStats {
    pub tracked_clients: usize,
}

pub struct RateLimiterRegistry {
    config: LimiterConfig,
    clients: Mutex<HashMap<String, ClientEntry>>,
    clock: SharedClock,
}

impl RateLimiterRegistry {
    pub fn new(config: LimiterConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// A panic while holding the lock must not take the limiter down with it
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientEntry>> {
        self.clients.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Admit or reject one request from `client_id`
    pub fn admit(&self, client_id: &str) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let now = self.clock.now();
        let mut clients = self.lock();

        let entry = clients
            .entry(client_id.to_string())
            .or_insert_with(|| ClientEntry {
                bucket: TokenBucket::new(self.config.burst, self.config.rps, now),
                last_seen: now,
            });
        entry.last_seen = now;

        if entry.bucket.try_consume(now) {
            Ok(())
        } else {
            debug!(client = client_id, "Rate limit exceeded");
            Err(GatehouseError::RateLimitExceeded)
        }
    }

    /// Remove entries idle for longer than `STALE_AFTER`. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let stale_after = ChronoDuration::seconds(STALE_AFTER.as_secs() as i64);

        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, entry| now - entry.last_seen <= stale_after);
        before - clients.len()
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.lock().contains_key(client_id)
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            tracked_clients: self.lock().len(),
        }
    }
}

/// Spawn the background sweep for the lifetime of the process
pub fn spawn_sweep_task(registry: Arc<RateLimiterRegistry>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = registry.sweep();
            if removed > 0 {
                debug!("Rate limiter sweep: removed {} idle clients", removed);
            }
            debug!(
                tracked_clients = registry.stats().tracked_clients,
                "Rate limiter stats"
            );
        }
    });
    info!(interval_secs = interval.as_secs(), "Rate limiter sweep task started");
}
