//! JSON request and response helpers shared by the route handlers

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE, WWW_AUTHENTICATE};
use hyper::{Method, Response, StatusCode, Uri};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::types::{GatehouseError, Result};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// Read and decode a JSON request body.
///
/// Empty, oversized, malformed and wrongly typed bodies each get their own
/// `BadRequest` message.
pub async fn read_json<T, B>(body: B) -> Result<T>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<http_body_util::LengthLimitError>() => {
            return Err(GatehouseError::BadRequest(format!(
                "body must not be larger than {} bytes",
                MAX_BODY_BYTES
            )))
        }
        Err(e) => return Err(GatehouseError::BadRequest(format!("failed to read body: {}", e))),
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(GatehouseError::BadRequest("body must not be empty".into()));
    }

    serde_json::from_slice(&bytes).map_err(|e| {
        use serde_json::error::Category;
        match e.classify() {
            Category::Data => {
                let message = e.to_string();
                match message.strip_prefix("unknown field ") {
                    Some(rest) => GatehouseError::BadRequest(format!(
                        "body contains unknown key {}",
                        rest.split(',').next().unwrap_or(rest)
                    )),
                    None => GatehouseError::BadRequest(format!(
                        "body contains incorrect JSON type ({})",
                        message
                    )),
                }
            }
            Category::Eof => GatehouseError::BadRequest("body contains badly-formed JSON".into()),
            _ => GatehouseError::from(e),
        }
    })
}

/// JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"error":"failed to encode response"}"#.to_string());

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Error response. Server faults are logged with the request they broke.
pub fn error_response(err: GatehouseError, method: &Method, uri: &Uri) -> Response<Full<Bytes>> {
    if err.is_server_fault() {
        error!(
            request_method = %method,
            request_url = %uri,
            error = %err,
            "Request failed"
        );
    }

    let challenge = err.requires_challenge();
    let (status, body) = err.into_status_code_and_body();

    let mut response = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap();

    if challenge {
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

pub fn not_found_response() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": "the requested resource could not be found" }),
    )
}

pub fn method_not_allowed_response(method: &Method) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({
            "error": format!("the {} method is not supported for this resource", method)
        }),
    )
}
