//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Every request passes
//! through, in order: panic recovery, CORS, rate limiter admission, principal
//! resolution, then routing. A client that disconnects drops the handler
//! future, abandoning whatever stage it was in.

use bytes::Bytes;
use futures::FutureExt;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, AUTHORIZATION, CONNECTION, CONTENT_TYPE, VARY};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::cors::{preflight_response, CorsPolicy};
use super::metrics::RequestMetrics;
use crate::config::Args;
use crate::limiter::client_identity;
use crate::pipeline::Gatehouse;
use crate::routes::{self, error_response};
use crate::types::{GatehouseError, Result};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, Infallible>;

const SERVER_ERROR_BODY: &str =
    r#"{"error":"the server encountered a problem and could not process your request"}"#;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub gatehouse: Arc<Gatehouse>,
    pub cors: CorsPolicy,
    pub metrics: RequestMetrics,
}

impl AppState {
    pub fn new(args: Args, gatehouse: Arc<Gatehouse>) -> Self {
        let cors = CorsPolicy::new(args.trusted_origins());
        Self {
            args,
            gatehouse,
            cors,
            metrics: RequestMetrics::new(),
        }
    }
}

/// Accept connections until the process is asked to stop
pub async fn run(state: Arc<AppState>) -> std::result::Result<(), GatehouseError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        addr = %state.args.listen,
        env = %state.args.environment,
        "Gatehouse listening"
    );

    if !state.args.limiter_enabled {
        warn!("Rate limiting disabled");
    }

    accept_until(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for shutdown signal: {:?}", e);
            std::future::pending::<()>().await;
        }
    })
    .await;

    info!("Shutdown signal received, no longer accepting connections");
    Ok(())
}

/// Serve connections from `listener` until `shutdown` completes
async fn accept_until<S>(listener: TcpListener, state: Arc<AppState>, shutdown: S)
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { Ok::<_, Infallible>(serve(state, addr, req).await) }
                        });

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            debug!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {:?}", e);
                }
            },
            _ = &mut shutdown => return,
        }
    }
}

/// Panic boundary and request counters around a single request
async fn serve(state: Arc<AppState>, addr: SocketAddr, req: Request<Incoming>) -> Response<BoxBody> {
    let started = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    state.metrics.request_received();

    let response = match AssertUnwindSafe(handle_request(&state, addr, req))
        .catch_unwind()
        .await
    {
        Ok(response) => response,
        Err(_) => {
            error!(request_method = %method, request_url = %uri, "Request handler panicked");
            panic_response()
        }
    };

    state
        .metrics
        .response_sent(response.status(), started.elapsed());
    to_boxed(response)
}

async fn handle_request(
    state: &AppState,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let origin = state.cors.trusted_origin(req.headers());

    debug!("[{}] {} {}", addr, method, uri);

    if state.cors.is_preflight(&method, req.headers()) {
        let mut response = preflight_response();
        state.cors.apply(origin, &mut response);
        return response;
    }

    let mut response = match run_pipeline(state, addr, req).await {
        Ok(response) => response,
        Err(e) => error_response(e, &method, &uri),
    };

    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    state.cors.apply(origin, &mut response);
    response
}

/// Admission, principal resolution and routing. The first failing stage ends the request.
async fn run_pipeline(
    state: &AppState,
    addr: SocketAddr,
    mut req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let client_id = client_identity(req.headers(), Some(addr), state.args.trust_proxy_headers)?;
    state.gatehouse.admit_request(&client_id)?;

    let header = match req.headers().get(AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| GatehouseError::Authentication)?),
        None => None,
    };
    let principal = state.gatehouse.resolve_principal(header).await?;
    req.extensions_mut().insert(principal);

    routes::route(state, req).await
}

/// Generic 500 for a panicked handler; the connection is not reused
fn panic_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(CONTENT_TYPE, "application/json")
        .header(CONNECTION, "close")
        .body(Full::new(Bytes::from_static(SERVER_ERROR_BODY.as_bytes())))
        .unwrap()
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{TokenTtls, TracingMailer};
    use crate::clock::ManualClock;
    use crate::limiter::LimiterConfig;
    use crate::store::MemoryStore;
    use clap::Parser;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    const WELL_FORMED_TOKEN: &str = "AAAAAAAAAAAAAAAAAAAAAA";

    async fn explode() -> u32 {
        panic!("boom")
    }

    async fn start(limiter: LimiterConfig) -> (SocketAddr, Arc<MemoryStore>, Arc<AppState>) {
        let store = Arc::new(MemoryStore::new());
        let gatehouse = Gatehouse::new(
            store.clone(),
            limiter,
            Arc::new(TracingMailer),
            Arc::new(ManualClock::default()),
            TokenTtls::default(),
        );
        let args = Args::try_parse_from(["gatehouse"]).unwrap();
        let state = Arc::new(AppState::new(args, Arc::new(gatehouse)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(accept_until(
            listener,
            Arc::clone(&state),
            std::future::pending(),
        ));
        (addr, store, state)
    }

    struct RawResponse {
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl RawResponse {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        fn json(&self) -> serde_json::Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    async fn send(
        addr: SocketAddr,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> RawResponse {
        let mut request = format!(
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n",
            body.len()
        );
        for (name, value) in headers {
            request.push_str(&format!("{name}: {value}\r\n"));
        }
        request.push_str("\r\n");
        request.push_str(body);

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        let (head, body) = raw.split_once("\r\n\r\n").unwrap();
        let mut lines = head.lines();
        let status = lines
            .next()
            .and_then(|line| line.split(' ').nth(1))
            .and_then(|code| code.parse().ok())
            .unwrap();
        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        RawResponse {
            status,
            headers,
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_anonymous_writes_are_challenged_before_input_is_read() {
        let (addr, _store, _state) = start(LimiterConfig::default()).await;

        let response = send(
            addr,
            "POST",
            "/v1/movies",
            &[("Content-Type", "application/json")],
            r#"{"bad":"#,
        )
        .await;
        assert_eq!(response.status, 401);
        assert_eq!(response.header("www-authenticate"), Some("Bearer"));
        assert_eq!(
            response.json()["error"],
            "you must be authenticated to access this resource"
        );

        let path = format!("/v1/movies/{}", uuid::Uuid::new_v4());
        let response = send(
            addr,
            "PATCH",
            &path,
            &[("X-Expected-Version", "zz")],
            "{}",
        )
        .await;
        assert_eq!(response.status, 401);
        assert_eq!(response.header("www-authenticate"), Some("Bearer"));
        assert!(response
            .headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("vary") && v == "Authorization"));
    }

    #[tokio::test]
    async fn test_rejected_request_never_reaches_resolver_or_store() {
        let limiter = LimiterConfig {
            enabled: true,
            rps: 1.0,
            burst: 1,
        };
        let (addr, store, _state) = start(limiter).await;
        let path = format!("/v1/movies/{}", uuid::Uuid::new_v4());
        let bearer = format!("Bearer {WELL_FORMED_TOKEN}");

        // Spend the only token; the clock never moves so nothing refills
        assert_eq!(send(addr, "GET", "/v1/healthcheck", &[], "").await.status, 200);

        store.fail_with(GatehouseError::Storage("connection refused".into()));

        let response = send(addr, "GET", &path, &[("Authorization", bearer.as_str())], "").await;
        assert_eq!(response.status, 429);
        assert_eq!(response.json()["error"], "rate limit exceeded");
        assert!(response.header("www-authenticate").is_none());

        let response = send(addr, "GET", &path, &[("Authorization", "Basic abc")], "").await;
        assert_eq!(response.status, 429);

        // Admitted, the same request does reach the failing store
        let (open_addr, open_store, _state) = start(LimiterConfig {
            enabled: false,
            ..LimiterConfig::default()
        })
        .await;
        open_store.fail_with(GatehouseError::Storage("connection refused".into()));
        let response = send(open_addr, "GET", &path, &[("Authorization", bearer.as_str())], "").await;
        assert_eq!(response.status, 500);

        let response = send(open_addr, "GET", &path, &[("Authorization", "Basic abc")], "").await;
        assert_eq!(response.status, 401);
    }

    #[tokio::test]
    async fn test_debug_vars_counts_requests() {
        let (addr, _store, state) = start(LimiterConfig::default()).await;

        assert_eq!(send(addr, "GET", "/v1/healthcheck", &[], "").await.status, 200);
        assert_eq!(send(addr, "GET", "/nowhere", &[], "").await.status, 404);

        let response = send(addr, "GET", "/debug/vars", &[], "").await;
        assert_eq!(response.status, 200);
        let vars = response.json();
        assert_eq!(vars["total_requests_received"], 3);
        assert_eq!(vars["total_responses_sent"], 2);
        assert_eq!(vars["total_responses_sent_by_status"]["200"], 1);
        assert_eq!(vars["total_responses_sent_by_status"]["404"], 1);
        assert_eq!(vars["tracked_clients"], 1);

        assert_eq!(state.metrics.snapshot().total_responses_sent, 3);
    }

    #[tokio::test]
    async fn test_panic_response_is_generic() {
        let response = panic_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONNECTION], "close");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json["error"],
            "the server encountered a problem and could not process your request"
        );
    }

    #[tokio::test]
    async fn test_panicking_future_is_caught() {
        let caught = AssertUnwindSafe(explode()).catch_unwind().await;
        assert!(caught.is_err());
    }
}
