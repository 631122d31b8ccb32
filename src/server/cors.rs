//! CORS for trusted origins
//!
//! Only origins on the configured list are reflected back. Preflight requests
//! from a trusted origin are answered here and never reach the pipeline.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use hyper::{HeaderMap, Method, Response, StatusCode};

const ALLOWED_METHODS: &str = "OPTIONS, PUT, PATCH, DELETE";
const ALLOWED_HEADERS: &str = "Authorization, Content-Type, X-Expected-Version";

#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    trusted_origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new(trusted_origins: Vec<String>) -> Self {
        Self { trusted_origins }
    }

    /// The request origin, if it is trusted
    pub fn trusted_origin(&self, headers: &HeaderMap) -> Option<HeaderValue> {
        let origin = headers.get(ORIGIN)?;
        let as_str = origin.to_str().ok()?;
        self.trusted_origins
            .iter()
            .any(|t| t == as_str)
            .then(|| origin.clone())
    }

    pub fn is_preflight(&self, method: &Method, headers: &HeaderMap) -> bool {
        method == Method::OPTIONS
            && headers.contains_key(ACCESS_CONTROL_REQUEST_METHOD)
            && self.trusted_origin(headers).is_some()
    }

    /// Decorate an outgoing response
    pub fn apply<B>(&self, origin: Option<HeaderValue>, response: &mut Response<B>) {
        let headers = response.headers_mut();
        headers.append(VARY, HeaderValue::from_static("Origin"));
        if let Some(origin) = origin {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
    }
}

/// CORS preflight response
pub fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS)
        .header(ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CorsPolicy {
        CorsPolicy::new(vec!["https://app.example".into()])
    }

    #[test]
    fn test_only_trusted_origin_reflected() {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static("https://evil.example"));
        assert!(policy().trusted_origin(&headers).is_none());

        headers.insert(ORIGIN, HeaderValue::from_static("https://app.example"));
        let origin = policy().trusted_origin(&headers);
        assert_eq!(origin.as_ref().unwrap(), "https://app.example");

        let mut response = Response::new(());
        policy().apply(origin, &mut response);
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example"
        );
        assert_eq!(response.headers()[VARY], "Origin");
    }

    #[test]
    fn test_preflight_detection() {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static("https://app.example"));
        assert!(!policy().is_preflight(&Method::OPTIONS, &headers));

        headers.insert(ACCESS_CONTROL_REQUEST_METHOD, HeaderValue::from_static("PATCH"));
        assert!(policy().is_preflight(&Method::OPTIONS, &headers));
        assert!(!policy().is_preflight(&Method::PATCH, &headers));
        assert!(!CorsPolicy::default().is_preflight(&Method::OPTIONS, &headers));
    }
}
