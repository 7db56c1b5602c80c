//! Origin allow-list.
//!
//! Requests without an `Origin` header (curl, server-to-server callers) always
//! pass. A browser origin passes when `origins.allowed` contains `*` or the
//! exact origin. Rejections carry CORS headers so the page can read them.

use axum::{
    body::Body,
    extract::State,
    http::{header::ORIGIN, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use serde_json::json;

use crate::http::response::json_error;
use crate::http::server::AppState;
use crate::proxy::headers::apply_cors;

pub const ANY_ORIGIN: &str = "*";

pub fn origin_allowed(allowed: &[String], origin: &str) -> bool {
    allowed
        .iter()
        .any(|entry| entry == ANY_ORIGIN || entry == origin)
}

pub async fn origin_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(ORIGIN)
        .map(|v| v.to_str().unwrap_or_default().to_string());
    let Some(origin) = origin else {
        return next.run(request).await;
    };

    let config = state.config.load_full();
    if origin_allowed(&config.origins.allowed, &origin) {
        return next.run(request).await;
    }

    tracing::warn!(origin = %origin, path = %request.uri().path(), "Rejected request from disallowed origin");
    let mut response = json_error(
        StatusCode::FORBIDDEN,
        "Origin not allowed",
        json!({ "origin": origin }),
    );
    apply_cors(response.headers_mut());
    response
}
