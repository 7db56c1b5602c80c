//! Forwarding failures and their client-facing rendering.

use std::error::Error as StdError;
use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::proxy::headers::apply_cors;

/// Every way a `/proxy` request can fail.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing 'url' parameter")]
    MissingTarget,

    #[error("Invalid URL format")]
    InvalidUrl { provided: String },

    #[error("Domain not allowed")]
    DomainBlocked { domain: String },

    #[error("Method not allowed")]
    UnsupportedMethod { method: String },

    #[error("Request body too large")]
    PayloadTooLarge { limit: usize },

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("Target not found: {0}")]
    UpstreamNotFound(String),

    #[error("Connection refused: {0}")]
    UpstreamRefused(String),

    #[error("Connection reset: {0}")]
    UpstreamReset(String),

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Upstream request failed: {0}")]
    UpstreamUnknown(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingTarget | Self::InvalidUrl { .. } | Self::BodyRead(_) => StatusCode::BAD_REQUEST,
            Self::DomainBlocked { .. } => StatusCode::FORBIDDEN,
            Self::UnsupportedMethod { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UpstreamNotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamRefused(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamReset(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Self::UpstreamUnknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for failures of the outbound call, as opposed to rejected input.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::UpstreamNotFound(_)
                | Self::UpstreamRefused(_)
                | Self::UpstreamReset(_)
                | Self::Timeout { .. }
                | Self::UpstreamUnknown(_)
        )
    }

    /// Short label for upstream failures, reported as `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamNotFound(_) => "Target not found",
            Self::UpstreamRefused(_) => "Connection refused",
            Self::UpstreamReset(_) => "Connection reset",
            Self::Timeout { .. } => "Request timeout",
            Self::UpstreamUnknown(_) => "Unknown error",
            Self::MissingTarget | Self::InvalidUrl { .. } | Self::DomainBlocked { .. } => "Invalid request",
            Self::UnsupportedMethod { .. } | Self::PayloadTooLarge { .. } | Self::BodyRead(_) => {
                "Invalid request"
            }
        }
    }

    /// Sanitized message for upstream failures. Internal detail is only
    /// exposed through `details` in debug mode.
    fn public_message(&self) -> &'static str {
        match self {
            Self::UpstreamNotFound(_) => "The target host could not be resolved",
            Self::UpstreamRefused(_) => "The target host refused the connection",
            Self::UpstreamReset(_) => "The connection to the target host was reset",
            Self::Timeout { .. } => "The target host did not respond in time",
            _ => "The request to the target host failed",
        }
    }

    /// JSON body in the `{error, message?, timestamp, ...context}` shape.
    pub fn to_json(&self, debug: bool) -> Value {
        let mut body = Map::new();

        match self {
            Self::MissingTarget => {
                body.insert("error".into(), json!(self.to_string()));
                body.insert(
                    "usage".into(),
                    json!("Include 'url' in query string (GET) or request body (POST/PUT/etc.)"),
                );
            }
            Self::InvalidUrl { provided } => {
                body.insert("error".into(), json!(self.to_string()));
                body.insert("provided".into(), json!(provided));
            }
            Self::DomainBlocked { domain } => {
                body.insert("error".into(), json!(self.to_string()));
                body.insert("domain".into(), json!(domain));
            }
            Self::UnsupportedMethod { method } => {
                body.insert("error".into(), json!(self.to_string()));
                body.insert("method".into(), json!(method));
            }
            Self::PayloadTooLarge { limit } => {
                body.insert("error".into(), json!(self.to_string()));
                body.insert("limit".into(), json!(limit));
            }
            Self::BodyRead(_) => {
                body.insert("error".into(), json!("Failed to read request body"));
            }
            _ => {
                body.insert("error".into(), json!("Proxy request failed"));
                body.insert("type".into(), json!(self.kind()));
                body.insert("message".into(), json!(self.public_message()));
            }
        }

        body.insert("timestamp".into(), json!(crate::timestamp()));

        if debug {
            body.insert("details".into(), json!(self.to_string()));
        }

        Value::Object(body)
    }

    /// Render as a response carrying CORS headers.
    pub fn into_response_with(self, debug: bool) -> Response {
        let mut response = (self.status_code(), Json(self.to_json(debug))).into_response();
        apply_cors(response.headers_mut());
        response
    }

    /// Classify a transport failure of the outbound client.
    pub fn from_upstream(err: &reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            return Self::Timeout { timeout_ms };
        }

        let detail = error_chain(err);
        let mut source: Option<&(dyn StdError + 'static)> = Some(err);
        while let Some(e) = source {
            if let Some(io_err) = e.downcast_ref::<io::Error>() {
                match io_err.kind() {
                    io::ErrorKind::ConnectionRefused => return Self::UpstreamRefused(detail),
                    io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe => return Self::UpstreamReset(detail),
                    io::ErrorKind::TimedOut => return Self::Timeout { timeout_ms },
                    _ => {}
                }
            }
            source = e.source();
        }

        let lowered = detail.to_ascii_lowercase();
        if lowered.contains("dns error")
            || lowered.contains("failed to lookup address")
            || lowered.contains("name or service not known")
            || lowered.contains("no such host")
        {
            Self::UpstreamNotFound(detail)
        } else if lowered.contains("connection refused") {
            Self::UpstreamRefused(detail)
        } else if lowered.contains("connection reset")
            || lowered.contains("connection closed before message completed")
        {
            Self::UpstreamReset(detail)
        } else {
            Self::UpstreamUnknown(detail)
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.into_response_with(false)
    }
}

/// Join an error and its sources into one line.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(e) = source {
        let text = e.to_string();
        if !parts.iter().any(|p| p.contains(&text)) {
            parts.push(text);
        }
        source = e.source();
    }
    parts.join(": ")
}
