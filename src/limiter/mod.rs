//! Admission control
//!
//! Every request is charged against a token bucket keyed by the caller's
//! address before any other stage runs.

pub mod bucket;
pub mod client_ip;
pub mod registry;

pub use bucket::TokenBucket;
pub use client_ip::{client_identity, to_canonical_ip};
pub use registry::{
    spawn_sweep_task, LimiterConfig, LimiterStats, RateLimiterRegistry, STALE_AFTER, SWEEP_INTERVAL,
};
