//! Account routes: registration, activation and token issuance

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde_json::json;

use super::respond::{json_response, read_json};
use crate::accounts::{ActivateRequest, LoginRequest, RegisterRequest};
use crate::server::AppState;
use crate::types::Result;

/// POST /v1/users
pub async fn register(state: &AppState, req: Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let input: RegisterRequest = read_json(req.into_body()).await?;
    let user = state.gatehouse.accounts().register(input).await?;
    Ok(json_response(StatusCode::ACCEPTED, &json!({ "user": user })))
}

/// PUT /v1/users/activated
pub async fn activate(state: &AppState, req: Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let input: ActivateRequest = read_json(req.into_body()).await?;
    let user = state.gatehouse.accounts().activate(input).await?;
    Ok(json_response(StatusCode::OK, &json!({ "user": user })))
}

/// POST /v1/tokens/authentication
pub async fn create_authentication_token(
    state: &AppState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let input: LoginRequest = read_json(req.into_body()).await?;
    let token = state.gatehouse.accounts().login(input).await?;
    Ok(json_response(
        StatusCode::CREATED,
        &json!({ "authentication_token": token }),
    ))
}
