//! The forwarding engine.
//!
//! One inbound request is turned into at most one outbound call:
//!
//! ```text
//! ReceiveTarget → Validate → AdmissionCheck → Dispatch → Relay
//!        │            │            │              │
//!        └────────────┴────────────┴──────────────┴──→ ErrorMapping
//! ```
//!
//! OPTIONS preflights short-circuit before the target is resolved. Every
//! terminal path records exactly one usage-stats update. The request timeout
//! bounds the wait for upstream headers and then every gap between body
//! chunks; a relay that stalls past it is aborted.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::header::{HeaderName, ACCEPT_ENCODING, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use futures_util::{stream, Stream, StreamExt, TryStreamExt};
use http_body_util::LengthLimitError;
use reqwest::redirect::Policy;
use url::Url;

use crate::config::ForwardConfig;
use crate::http::request::{query_param, request_id};
use crate::observability::metrics;
use crate::observability::UsageStats;
use crate::proxy::codec::{encode_body, method_carries_body, InboundBody};
use crate::proxy::error::{error_chain, ProxyError};
use crate::proxy::headers::{apply_cors, apply_preflight, filter_inbound, filter_outbound};
use crate::proxy::validator::parse_target;
use crate::security::blocklist::DomainBlockList;

pub const X_PROXY_TARGET: HeaderName = HeaderName::from_static("x-proxy-target");
pub const X_PROXY_STATUS: HeaderName = HeaderName::from_static("x-proxy-status");
pub const X_PROXY_TIME: HeaderName = HeaderName::from_static("x-proxy-time");

/// Recorded as the target when none could be resolved.
const UNKNOWN_TARGET: &str = "unknown";

/// Everything the engine needs to send one outbound call.
#[derive(Debug)]
pub struct ForwardRequest {
    pub method: Method,
    pub target: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Per-request bookkeeping shared by every terminal path.
struct Exchange {
    request_id: String,
    method: Method,
    target: String,
    start: Instant,
}

pub struct ForwardingEngine {
    client: reqwest::Client,
    blocklist: Arc<DomainBlockList>,
    stats: Arc<UsageStats>,
}

impl ForwardingEngine {
    /// Build the engine and its outbound client. The client is created once;
    /// connect timeout and redirect limit are fixed at construction.
    pub fn new(
        config: &ForwardConfig,
        blocklist: Arc<DomainBlockList>,
        stats: Arc<UsageStats>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(Policy::limited(config.max_redirects))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            blocklist,
            stats,
        })
    }

    pub fn stats(&self) -> &Arc<UsageStats> {
        &self.stats
    }

    /// Handle one `/proxy` request against a configuration snapshot.
    pub async fn forward(&self, request: Request<Body>, config: &ForwardConfig) -> Response {
        let (parts, body) = request.into_parts();
        let query_target = query_param(&parts.uri, "url").filter(|url| !url.is_empty());

        let mut exchange = Exchange {
            request_id: request_id(&parts.headers),
            method: parts.method.clone(),
            target: UNKNOWN_TARGET.to_string(),
            start: Instant::now(),
        };

        if !is_supported(&parts.method) {
            let err = ProxyError::UnsupportedMethod {
                method: parts.method.to_string(),
            };
            return self.fail(&exchange, err, config);
        }

        if parts.method == Method::OPTIONS {
            if let Some(target) = query_target {
                exchange.target = target;
            }
            return self.preflight(&exchange);
        }

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let inbound = if method_carries_body(&parts.method) {
            match read_body(body, config.max_body_size).await {
                Ok(bytes) => InboundBody::from_bytes(bytes, content_type.as_deref()),
                Err(err) => return self.fail(&exchange, err, config),
            }
        } else {
            InboundBody::Raw(Bytes::new())
        };

        // ReceiveTarget
        let raw_target = match parts.method {
            Method::GET | Method::HEAD => query_target,
            _ => inbound
                .url_field()
                .filter(|url| !url.is_empty())
                .or(query_target),
        };
        let Some(raw_target) = raw_target else {
            return self.fail(&exchange, ProxyError::MissingTarget, config);
        };
        exchange.target = raw_target;

        // Validate
        let Some(target) = parse_target(&exchange.target) else {
            let err = ProxyError::InvalidUrl {
                provided: exchange.target.clone(),
            };
            return self.fail(&exchange, err, config);
        };

        // AdmissionCheck
        let host = target.host_str().unwrap_or_default().to_string();
        if self.blocklist.is_host_blocked(&host) {
            metrics::record_blocked();
            return self.fail(&exchange, ProxyError::DomainBlocked { domain: host }, config);
        }

        // Dispatch
        let mut headers = filter_inbound(&parts.headers);
        headers.remove(ACCEPT_ENCODING);
        let outbound = ForwardRequest {
            body: encode_body(&parts.method, content_type.as_deref(), &inbound),
            method: parts.method,
            target,
            headers,
        };

        match self.dispatch(outbound, config.request_timeout_ms).await {
            Ok(upstream) => self.relay(&exchange, upstream, config),
            Err(err) => self.fail(&exchange, err, config),
        }
    }

    /// Send the outbound call. The deadline covers everything up to the
    /// arrival of the upstream response headers.
    pub async fn dispatch(
        &self,
        request: ForwardRequest,
        timeout_ms: u64,
    ) -> Result<reqwest::Response, ProxyError> {
        let mut builder = self
            .client
            .request(request.method, request.target)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        match tokio::time::timeout(Duration::from_millis(timeout_ms), builder.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ProxyError::from_upstream(&e, timeout_ms)),
            Err(_) => Err(ProxyError::Timeout { timeout_ms }),
        }
    }

    fn preflight(&self, exchange: &Exchange) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_preflight(response.headers_mut());

        self.stats.record(&exchange.target, true, None);
        metrics::record_request(exchange.method.as_str(), 204, "preflight", exchange.start);
        tracing::debug!(request_id = %exchange.request_id, "Answered CORS preflight");
        response
    }

    fn relay(&self, exchange: &Exchange, upstream: reqwest::Response, config: &ForwardConfig) -> Response {
        let status = upstream.status();
        let elapsed_ms = exchange.start.elapsed().as_millis();

        let mut headers = filter_outbound(upstream.headers());
        apply_cors(&mut headers);
        if config.debug_headers {
            if let Ok(value) = HeaderValue::from_str(&exchange.target) {
                headers.insert(X_PROXY_TARGET, value);
            }
            headers.insert(X_PROXY_STATUS, HeaderValue::from(status.as_u16()));
            if let Ok(value) = HeaderValue::from_str(&format!("{elapsed_ms}ms")) {
                headers.insert(X_PROXY_TIME, value);
            }
        }

        self.stats.record(&exchange.target, true, None);
        metrics::record_request(exchange.method.as_str(), status.as_u16(), "success", exchange.start);
        tracing::info!(
            request_id = %exchange.request_id,
            method = %exchange.method,
            target = %exchange.target,
            status = status.as_u16(),
            elapsed_ms = elapsed_ms as u64,
            "Relaying upstream response"
        );

        // A body error after this point aborts the client connection.
        let request_id = exchange.request_id.clone();
        let idle = Duration::from_millis(config.request_timeout_ms);
        let stream = relay_body(upstream, idle).inspect_err(move |e| {
            metrics::record_relay_aborted();
            tracing::warn!(request_id = %request_id, error = %e, "Upstream body failed mid-stream");
        });

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    fn fail(&self, exchange: &Exchange, err: ProxyError, config: &ForwardConfig) -> Response {
        let status = err.status_code();
        let detail = error_chain(&err);

        self.stats.record(&exchange.target, false, Some(&detail));
        metrics::record_request(exchange.method.as_str(), status.as_u16(), "failure", exchange.start);

        if err.is_upstream() {
            tracing::warn!(
                request_id = %exchange.request_id,
                target = %exchange.target,
                status = status.as_u16(),
                error = %detail,
                "Upstream request failed"
            );
        } else {
            tracing::debug!(
                request_id = %exchange.request_id,
                target = %exchange.target,
                status = status.as_u16(),
                error = %detail,
                "Rejected proxy request"
            );
        }

        err.into_response_with(config.debug_errors)
    }
}

fn is_supported(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET
            | Method::POST
            | Method::PUT
            | Method::PATCH
            | Method::DELETE
            | Method::HEAD
            | Method::OPTIONS
    )
}

/// Upstream body chunks. Ends with an error when the upstream fails or stays
/// silent for longer than `idle`.
fn relay_body(
    upstream: reqwest::Response,
    idle: Duration,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    let chunks = Box::pin(upstream.bytes_stream());

    stream::unfold(Some(chunks), move |state| async move {
        let mut chunks = state?;
        match tokio::time::timeout(idle, chunks.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(chunks))),
            Ok(Some(Err(e))) => Some((Err(io::Error::other(e)), None)),
            Ok(None) => None,
            Err(_) => {
                let err = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("upstream body idle for more than {}ms", idle.as_millis()),
                );
                Some((Err(err), None))
            }
        }
    })
}

/// Collect the inbound body, failing once more than `limit` bytes have arrived.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, ProxyError> {
    axum::body::to_bytes(body, limit).await.map_err(|err| {
        if is_length_limit(&err) {
            ProxyError::PayloadTooLarge { limit }
        } else {
            ProxyError::BodyRead(err.to_string())
        }
    })
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatsConfig;

    fn engine(blocked: &[&str]) -> ForwardingEngine {
        ForwardingEngine::new(
            &ForwardConfig::default(),
            Arc::new(DomainBlockList::new(blocked.iter().copied())),
            Arc::new(UsageStats::new(&StatsConfig::default())),
        )
        .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_target() {
        let engine = engine(&[]);
        let request = Request::get("/proxy").body(Body::empty()).unwrap();

        let response = engine.forward(request, &ForwardConfig::default()).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body = json_body(response).await;
        assert_eq!(body["error"], "Missing 'url' parameter");

        let snap = engine.stats().snapshot();
        assert_eq!(snap.overview.failed_requests, 1);
        assert_eq!(snap.recent_errors[0].url, "unknown");
    }

    #[tokio::test]
    async fn test_invalid_target() {
        let engine = engine(&[]);
        let request = Request::get("/proxy?url=not-a-url").body(Body::empty()).unwrap();

        let response = engine.forward(request, &ForwardConfig::default()).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Invalid URL format");
        assert_eq!(body["provided"], "not-a-url");
    }

    #[tokio::test]
    async fn test_blocked_subdomain() {
        let engine = engine(&["blocked.example"]);
        let request = Request::get("/proxy?url=https%3A%2F%2Fapi.blocked.example%2Fv1")
            .body(Body::empty())
            .unwrap();

        let response = engine.forward(request, &ForwardConfig::default()).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Domain not allowed");
        assert_eq!(body["domain"], "api.blocked.example");
    }

    #[tokio::test]
    async fn test_fully_qualified_blocked_host() {
        let engine = engine(&["blocked.example"]);

        for target in ["https://blocked.example./api", "https://sub.blocked.example./api"] {
            let uri = format!("/proxy?url={target}");
            let request = Request::get(uri).body(Body::empty()).unwrap();

            let response = engine.forward(request, &ForwardConfig::default()).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{target}");
        }
        assert_eq!(engine.stats().snapshot().overview.failed_requests, 2);
    }

    #[tokio::test]
    async fn test_preflight_short_circuits() {
        let engine = engine(&[]);
        let request = Request::options("/proxy").body(Body::empty()).unwrap();

        let response = engine.forward(request, &ForwardConfig::default()).await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["access-control-max-age"], "86400");
        assert_eq!(engine.stats().snapshot().overview.successful_requests, 1);
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let engine = engine(&[]);
        let request = Request::builder()
            .method("TRACE")
            .uri("/proxy?url=https://example.com")
            .body(Body::empty())
            .unwrap();

        let response = engine.forward(request, &ForwardConfig::default()).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_body_limit_counts_received_bytes() {
        let engine = engine(&[]);
        let config = ForwardConfig {
            max_body_size: 8,
            ..ForwardConfig::default()
        };
        let request = Request::post("/proxy")
            .header("content-type", "application/json")
            .body(Body::from("{\"url\":\"https://example.com\"}"))
            .unwrap();

        let response = engine.forward(request, &config).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_body_limit_applies_to_chunked_bodies() {
        let engine = engine(&[]);
        let config = ForwardConfig {
            max_body_size: 8,
            ..ForwardConfig::default()
        };
        let chunks = stream::iter(["0123", "4567", "89"].map(|c| Ok::<_, io::Error>(Bytes::from(c))));
        let request = Request::post("/proxy?url=https://example.com")
            .header("content-type", "application/octet-stream")
            .body(Body::from_stream(chunks))
            .unwrap();

        let response = engine.forward(request, &config).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_target_from_json_body() {
        let engine = engine(&["blocked.example"]);
        let request = Request::post("/proxy?url=https://ignored.example")
            .header("content-type", "application/json")
            .body(Body::from("{\"url\":\"https://blocked.example/x\"}"))
            .unwrap();

        let response = engine.forward(request, &ForwardConfig::default()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_target_falls_back_to_query() {
        let engine = engine(&["blocked.example"]);
        let request = Request::post("/proxy?url=https://blocked.example/x")
            .header("content-type", "application/octet-stream")
            .body(Body::from(vec![0u8, 1, 2, 3]))
            .unwrap();

        let response = engine.forward(request, &ForwardConfig::default()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
