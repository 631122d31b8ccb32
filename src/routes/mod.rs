//! HTTP routes for Gatehouse
//!
//! Handlers run after admission and principal resolution. Each returns a
//! `Result`; errors are rendered by the server.

pub mod debug;
pub mod health;
pub mod movies;
pub mod respond;
pub mod users;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use uuid::Uuid;

use crate::server::AppState;
use crate::types::Result;

pub use health::health_check;
pub use respond::{error_response, json_response, method_not_allowed_response, not_found_response};

/// Dispatch a request to its handler
pub async fn route(state: &AppState, req: Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.trim_end_matches('/').split('/').skip(1).collect();

    match segments.as_slice() {
        ["v1", "healthcheck"] => match method {
            Method::GET => Ok(health_check(state)),
            _ => Ok(method_not_allowed_response(&method)),
        },

        ["debug", "vars"] => match method {
            Method::GET => Ok(debug::vars(state)),
            _ => Ok(method_not_allowed_response(&method)),
        },

        ["v1", "users"] => match method {
            Method::POST => users::register(state, req).await,
            _ => Ok(method_not_allowed_response(&method)),
        },

        ["v1", "users", "activated"] => match method {
            Method::PUT => users::activate(state, req).await,
            _ => Ok(method_not_allowed_response(&method)),
        },

        ["v1", "tokens", "authentication"] => match method {
            Method::POST => users::create_authentication_token(state, req).await,
            _ => Ok(method_not_allowed_response(&method)),
        },

        ["v1", "movies"] => match method {
            Method::POST => movies::create(state, req).await,
            _ => Ok(method_not_allowed_response(&method)),
        },

        ["v1", "movies", id] => {
            // Unparseable ids name no resource
            let Ok(id) = Uuid::parse_str(id) else {
                return Ok(not_found_response());
            };
            match method {
                Method::GET => movies::show(state, req, id).await,
                Method::PATCH => movies::update(state, req, id).await,
                Method::DELETE => movies::delete(state, req, id).await,
                _ => Ok(method_not_allowed_response(&method)),
            }
        }

        _ => Ok(not_found_response()),
    }
}
