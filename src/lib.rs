//! Gatehouse - request pipeline for a token-authenticated JSON API
//!
//! Every request runs the same stages before reaching a handler:
//!
//! - **Admission**: per-client token bucket rate limiting
//! - **Resolution**: bearer token to [`auth::Principal`], anonymous when absent
//! - **Authorization**: activation and permission-code checks
//! - **Versioned writes**: optimistic concurrency for mutable records
//!
//! State lives behind the traits in [`store`]; [`store::MemoryStore`] and
//! [`db::MongoStore`] implement them.

pub mod accounts;
pub mod auth;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod db;
pub mod limiter;
pub mod pipeline;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;
pub mod validation;
pub mod versioning;

pub use config::Args;
pub use pipeline::Gatehouse;
pub use server::{run, AppState};
pub use types::{GatehouseError, Result};
