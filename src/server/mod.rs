//! HTTP server for Gatehouse

pub mod cors;
pub mod http;
pub mod metrics;

pub use cors::CorsPolicy;
pub use http::{run, AppState};
pub use metrics::{MetricsSnapshot, RequestMetrics};
