//! API-key authentication for the forwarding endpoint.
//!
//! When `auth.proxy_api_key` is configured, a credential must be presented as
//! `X-API-Key`, as `Authorization: Bearer <key>`, or as the `apiKey` query
//! parameter, checked in that order. Preflights pass without credentials.
//! Headers carrying the gateway's own key are removed before forwarding.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Method, Request, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use serde_json::json;

use crate::http::request::query_param;
use crate::http::response::json_error;
use crate::http::server::AppState;

pub const X_API_KEY: &str = "x-api-key";

/// Compare two byte strings without short-circuiting on the first mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len_eq = a.len() == b.len();
    let max_len = a.len().max(b.len());
    let mut result = 0u8;

    for i in 0..max_len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        result |= x ^ y;
    }

    len_eq && result == 0
}

/// The credential presented for the forwarding endpoint, if any.
pub fn proxy_credential(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(key) = headers.get(X_API_KEY).and_then(|v| v.to_str().ok()) {
        return Some(key.to_string());
    }
    if let Some(auth) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        return Some(auth.strip_prefix("Bearer ").unwrap_or(auth).to_string());
    }
    query_param(uri, "apiKey")
}

/// True when `provided` matches the configured `expected` key.
pub fn key_matches(expected: &str, provided: Option<&str>) -> bool {
    provided.is_some_and(|provided| constant_time_eq(expected.as_bytes(), provided.as_bytes()))
}

/// Remove `X-API-Key` and `Authorization` when they carry `key`. Other values
/// are left for the target.
pub fn strip_gateway_key(headers: &mut HeaderMap, key: &str) {
    let carries_key = |value: &str| constant_time_eq(value.as_bytes(), key.as_bytes());

    if headers
        .get(X_API_KEY)
        .and_then(|v| v.to_str().ok())
        .is_some_and(carries_key)
    {
        headers.remove(X_API_KEY);
    }
    if headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|auth| carries_key(auth.strip_prefix("Bearer ").unwrap_or(auth)))
    {
        headers.remove(AUTHORIZATION);
    }
}

pub async fn proxy_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.load_full();
    let Some(expected) = config.auth.proxy_api_key.as_deref() else {
        return next.run(request).await;
    };

    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let provided = proxy_credential(request.headers(), request.uri());
    if key_matches(expected, provided.as_deref()) {
        let mut request = request;
        strip_gateway_key(request.headers_mut(), expected);
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Rejected request without a valid API key");
    json_error(
        StatusCode::UNAUTHORIZED,
        "Unauthorized",
        json!({
            "message": "Valid API key required. Provide via X-API-Key header, Authorization Bearer token, or apiKey query parameter"
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secre"));
        assert!(!constant_time_eq(b"", b"a"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_credential_sources_in_order() {
        let uri: Uri = "/proxy?apiKey=from-query".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(proxy_credential(&headers, &uri).as_deref(), Some("from-query"));

        headers.insert("authorization", HeaderValue::from_static("Bearer from-bearer"));
        assert_eq!(proxy_credential(&headers, &uri).as_deref(), Some("from-bearer"));

        headers.insert("x-api-key", HeaderValue::from_static("from-header"));
        assert_eq!(proxy_credential(&headers, &uri).as_deref(), Some("from-header"));

        let bare: Uri = "/proxy".parse().unwrap();
        assert_eq!(proxy_credential(&HeaderMap::new(), &bare), None);
    }

    #[test]
    fn test_strip_gateway_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("gateway-key"));
        headers.insert("authorization", HeaderValue::from_static("Bearer upstream-token"));
        headers.insert("x-other", HeaderValue::from_static("kept"));

        strip_gateway_key(&mut headers, "gateway-key");

        assert!(!headers.contains_key("x-api-key"));
        assert_eq!(headers["authorization"], "Bearer upstream-token");
        assert_eq!(headers["x-other"], "kept");

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer gateway-key"));
        strip_gateway_key(&mut headers, "gateway-key");
        assert!(headers.is_empty());
    }

    #[test]
    fn test_key_matches() {
        assert!(key_matches("k", Some("k")));
        assert!(!key_matches("k", Some("x")));
        assert!(!key_matches("k", None));
    }
}
