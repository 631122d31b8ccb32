//! Movie routes
//!
//! Updates honour an optional `X-Expected-Version` header; without it the
//! version read at the start of the request is the one committed against.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, LOCATION};
use hyper::{HeaderMap, Request, Response, StatusCode};
use serde_json::json;
use uuid::Uuid;

use super::respond::{json_response, read_json};
use crate::auth::Principal;
use crate::catalog::{MovieInput, MoviePatch};
use crate::server::AppState;
use crate::types::{GatehouseError, Result};

pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

fn principal(req: &Request<Incoming>) -> Principal {
    req.extensions().get::<Principal>().cloned().unwrap_or_default()
}

/// Parse the optional pinned version
pub fn expected_version(headers: &HeaderMap) -> Result<Option<i64>> {
    let Some(value) = headers.get(EXPECTED_VERSION_HEADER) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .map(Some)
        .ok_or_else(|| {
            GatehouseError::BadRequest("X-Expected-Version must be a positive integer".into())
        })
}

/// POST /v1/movies
pub async fn create(state: &AppState, req: Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let principal = principal(&req);
    let input = read_json::<MovieInput, _>(req.into_body());
    let movie = state.gatehouse.create_movie_with(&principal, input).await?;

    let mut response = json_response(StatusCode::CREATED, &json!({ "movie": movie }));
    if let Ok(location) = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id)) {
        response.headers_mut().insert(LOCATION, location);
    }
    Ok(response)
}

/// GET /v1/movies/{id}
pub async fn show(state: &AppState, req: Request<Incoming>, id: Uuid) -> Result<Response<Full<Bytes>>> {
    let movie = state.gatehouse.show_movie(&principal(&req), id).await?;
    Ok(json_response(StatusCode::OK, &json!({ "movie": movie })))
}

/// PATCH /v1/movies/{id}
pub async fn update(state: &AppState, req: Request<Incoming>, id: Uuid) -> Result<Response<Full<Bytes>>> {
    let principal = principal(&req);
    let (parts, body) = req.into_parts();

    // Header and body are only looked at once the gate has passed
    let request = async move {
        let expected = expected_version(&parts.headers)?;
        let patch: MoviePatch = read_json(body).await?;
        Ok::<_, GatehouseError>((expected, patch))
    };

    let movie = state
        .gatehouse
        .update_movie_with(&principal, id, request)
        .await?;
    Ok(json_response(StatusCode::OK, &json!({ "movie": movie })))
}

/// DELETE /v1/movies/{id}
pub async fn delete(state: &AppState, req: Request<Incoming>, id: Uuid) -> Result<Response<Full<Bytes>>> {
    state.gatehouse.delete_movie(&principal(&req), id).await?;
    Ok(json_response(
        StatusCode::OK,
        &json!({ "message": "movie successfully deleted" }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_version_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(expected_version(&headers).unwrap(), None);

        headers.insert(EXPECTED_VERSION_HEADER, HeaderValue::from_static("3"));
        assert_eq!(expected_version(&headers).unwrap(), Some(3));

        headers.insert(EXPECTED_VERSION_HEADER, HeaderValue::from_static("three"));
        assert!(matches!(
            expected_version(&headers),
            Err(GatehouseError::BadRequest(_))
        ));

        headers.insert(EXPECTED_VERSION_HEADER, HeaderValue::from_static("0"));
        assert!(expected_version(&headers).is_err());
    }
}
