//! Runtime variables
//!
//! Request counters plus build and limiter state, in one flat JSON object.

use bytes::Bytes;
use chrono::Utc;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::respond::json_response;
use crate::server::{AppState, MetricsSnapshot};

#[derive(Serialize)]
pub struct DebugVars {
    pub version: &'static str,
    pub timestamp: i64,
    pub tracked_clients: usize,
    #[serde(flatten)]
    pub requests: MetricsSnapshot,
}

/// GET /debug/vars
pub fn vars(state: &AppState) -> Response<Full<Bytes>> {
    let vars = DebugVars {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().timestamp(),
        tracked_clients: state.gatehouse.limiter().stats().tracked_clients,
        requests: state.metrics.snapshot(),
    };

    json_response(StatusCode::OK, &vars)
}
