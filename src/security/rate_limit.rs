//! Fixed-window rate limiting per client IP.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde_json::json;

use crate::http::server::AppState;
use crate::observability::metrics;

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Paths never counted against the limit.
const EXEMPT_PATHS: &[&str] = &["/", "/health"];

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the current window ends.
    pub reset_secs: u64,
}

impl RateDecision {
    fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(self.reset_secs));
    }
}

/// Request counters keyed by client.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request from `key` against `max` per `window`.
    pub fn check(&self, key: &str, window: Duration, max: u32) -> RateDecision {
        self.check_at(key, window, max, Instant::now())
    }

    fn check_at(&self, key: &str, window: Duration, max: u32, now: Instant) -> RateDecision {
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            hits: 0,
        });

        if now.duration_since(entry.started) >= window {
            *entry = Window {
                started: now,
                hits: 0,
            };
        }

        let allowed = entry.hits < max;
        if allowed {
            entry.hits += 1;
        }

        let remaining_time = window.saturating_sub(now.duration_since(entry.started));
        RateDecision {
            allowed,
            limit: max,
            remaining: max.saturating_sub(entry.hits),
            reset_secs: remaining_time.as_secs_f64().ceil() as u64,
        }
    }

    /// Drop windows that have ended. Returns how many were removed.
    pub fn purge_expired(&self, window: Duration) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| w.started.elapsed() < window);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

fn client_key(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.load_full();
    if !config.rate_limit.enabled || EXEMPT_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let key = client_key(&request);
    let window = Duration::from_millis(config.rate_limit.window_ms);
    let decision = state
        .rate_limiter
        .check(&key, window, config.rate_limit.max_requests);

    if decision.allowed {
        let mut response = next.run(request).await;
        decision.write_headers(response.headers_mut());
        return response;
    }

    tracing::warn!(client = %key, limit = decision.limit, "Rate limit exceeded");
    metrics::record_rate_limited();

    let retry_after = window.as_secs_f64().ceil() as u64;
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "Rate limit exceeded",
            "retryAfter": retry_after,
            "limit": decision.limit,
        })),
    )
        .into_response();
    decision.write_headers(response.headers_mut());
    response
        .headers_mut()
        .insert(axum::http::header::RETRY_AFTER, HeaderValue::from(decision.reset_secs));
    response
}
