//! Header transforms applied in both directions.
//!
//! Inbound headers lose transport-specific entries before they are sent
//! upstream; upstream headers lose hop-by-hop and cookie entries before they
//! are relayed. Every response leaving the gateway carries permissive CORS
//! headers. `HeaderMap` names are case-insensitive, so all matching is too.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE,
};
use axum::http::{HeaderMap, HeaderValue};

/// Stripped from the caller's headers before forwarding upstream.
pub const INBOUND_DENY_LIST: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

/// Stripped from upstream headers before relaying to the caller.
pub const OUTBOUND_DENY_LIST: &[&str] = &[
    "transfer-encoding",
    "content-encoding",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "upgrade",
    "set-cookie",
];

pub const ALLOWED_METHODS: &str = "GET,POST,PUT,PATCH,DELETE,OPTIONS,HEAD";

/// Preflight cache lifetime in seconds (24 hours).
pub const PREFLIGHT_MAX_AGE: &str = "86400";

/// Copy `headers` without any entry named in `deny_list`.
pub fn filter_headers(headers: &HeaderMap, deny_list: &[&str]) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !deny_list
            .iter()
            .any(|denied| name.as_str().eq_ignore_ascii_case(denied))
        {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

pub fn filter_inbound(headers: &HeaderMap) -> HeaderMap {
    filter_headers(headers, INBOUND_DENY_LIST)
}

pub fn filter_outbound(headers: &HeaderMap) -> HeaderMap {
    filter_headers(headers, OUTBOUND_DENY_LIST)
}

/// Set the four CORS headers, replacing whatever upstream sent for them.
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("*"));
}

/// CORS headers plus the preflight cache lifetime.
pub fn apply_preflight(headers: &mut HeaderMap) {
    apply_cors(headers);
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(PREFLIGHT_MAX_AGE));
}
