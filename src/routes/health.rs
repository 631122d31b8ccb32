//! Health check endpoint
//!
//! Reports availability, environment and build information. Always open to
//! anonymous callers.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::respond::json_response;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub system_info: SystemInfo,
}

#[derive(Serialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: &'static str,
    pub commit: &'static str,
    pub build_time: &'static str,
    /// Clients currently tracked by the rate limiter
    pub tracked_clients: usize,
}

pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let response = HealthResponse {
        status: "available",
        system_info: SystemInfo {
            environment: state.args.environment.clone(),
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
            build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
            tracked_clients: state.gatehouse.limiter().stats().tracked_clients,
        },
    };

    json_response(StatusCode::OK, &response)
}
