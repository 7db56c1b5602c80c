//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the forwarding, service and admin endpoints
//! - Wire up middleware (request ID, tracing, rate limiting, origins, auth, headers)
//! - Own the shared state injected into handlers
//! - Apply configuration updates from the watcher
//! - Serve until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{header::HOST, HeaderMap, Method, Request, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::admin::setup_admin_router;
use crate::config::ProxyConfig;
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::lifecycle::MaintenanceTask;
use crate::observability::UsageStats;
use crate::proxy::ForwardingEngine;
use crate::security::auth::proxy_auth_middleware;
use crate::security::headers::{with_cors_origin, with_security_headers};
use crate::security::origins::origin_middleware;
use crate::security::rate_limit::rate_limit_middleware;
use crate::security::{DomainBlockList, RateLimiter};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to build outbound HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live configuration; each request loads one snapshot.
    pub config: Arc<ArcSwap<ProxyConfig>>,
    pub engine: Arc<ForwardingEngine>,
    pub blocklist: Arc<DomainBlockList>,
    pub stats: Arc<UsageStats>,
    pub rate_limiter: Arc<RateLimiter>,
    pub started_at: Instant,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let blocklist = Arc::new(DomainBlockList::new(&config.proxy.blocked_domains));
        let stats = Arc::new(UsageStats::new(&config.stats));
        let engine = Arc::new(ForwardingEngine::new(
            &config.proxy,
            blocklist.clone(),
            stats.clone(),
        )?);

        let state = AppState {
            config: Arc::new(ArcSwap::from_pointee(config)),
            engine,
            blocklist,
            stats,
            rate_limiter: Arc::new(RateLimiter::new()),
            started_at: Instant::now(),
        };

        let router = Self::build_router(state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let config = state.config.load_full();

        let proxy_routes = Router::new()
            .route("/proxy", any(proxy_handler))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                proxy_auth_middleware,
            ));

        let mut router = Router::new()
            .route("/", get(health_handler))
            .route("/health", get(health_handler))
            .route("/docs", get(docs_handler))
            .merge(proxy_routes)
            .merge(setup_admin_router(state.clone()))
            .fallback(not_found_handler)
            .layer(middleware::from_fn_with_state(
                state.clone(),
                origin_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_middleware,
            ))
            .with_state(state);

        if config.security.enable_headers {
            router = with_security_headers(router);
        }

        with_cors_origin(router).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get(X_REQUEST_ID)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("unknown");
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri().path(),
                            request_id = %request_id,
                        )
                    }),
                )
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID)),
        )
    }

    /// A clone of the fully layered router, for driving requests in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let maintenance = MaintenanceTask::new(
            self.state.config.clone(),
            self.state.stats.clone(),
            self.state.rate_limiter.clone(),
        );
        tokio::spawn(maintenance.run(shutdown.resubscribe()));

        let live_config = self.state.config.clone();
        let mut updates_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(new_config) => {
                            live_config.store(Arc::new(new_config));
                            tracing::info!("Configuration reloaded");
                        }
                        None => break,
                    },
                    _ = updates_shutdown.recv() => break,
                }
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let config = state.config.load_full();
    state.engine.forward(request, &config.proxy).await
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let config = state.config.load_full();
    let mut body = json!({
        "status": "healthy",
        "service": "CORS Proxy Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": crate::timestamp(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
    });

    if config.observability.include_config {
        body["config"] = json!({
            "bindAddress": config.listener.bind_address,
            "maxBodySize": config.proxy.max_body_size,
            "rateLimitWindow": config.rate_limit.window_ms,
            "rateLimitMax": config.rate_limit.max_requests,
        });
    }

    Json(body)
}

async fn docs_handler(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let config = state.config.load_full();
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let base = format!("http://{host}");
    let auth_required = config.auth.proxy_api_key.is_some();

    let authentication = if auth_required {
        json!({
            "required": true,
            "methods": ["X-API-Key header", "Authorization: Bearer <token>", "apiKey query parameter"],
            "note": "API key authentication is enabled",
        })
    } else {
        json!({
            "required": false,
            "note": "No authentication required (set PROXY_API_KEY to enable)",
        })
    };

    let get_example = if auth_required {
        format!("{base}/proxy?url=https://api.example.com/data&apiKey=YOUR_API_KEY")
    } else {
        format!("{base}/proxy?url=https://api.example.com/data")
    };

    let post_headers = if auth_required {
        json!({ "X-API-Key": "YOUR_API_KEY" })
    } else {
        json!({})
    };

    let admin_endpoints = if config.auth.admin_api_key.is_some() {
        json!({
            "stats": format!("{base}/admin/stats"),
            "config": format!("{base}/admin/config"),
            "resetStats": format!("{base}/admin/reset-stats"),
            "blockDomain": format!("{base}/admin/block-domain"),
            "unblockDomain": format!("{base}/admin/unblock-domain/{{domain}}"),
            "authentication": "Include X-Admin-Key header or adminKey query parameter",
        })
    } else {
        json!("Admin endpoints disabled (set ADMIN_API_KEY to enable)")
    };

    Json(json!({
        "name": "CORS Proxy Gateway",
        "description": "Forwards browser requests to any http(s) API and adds permissive CORS headers",
        "usage": {
            "endpoint": "/proxy",
            "methods": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"],
            "parameters": { "url": "Target URL to proxy (required)" },
            "authentication": authentication,
            "examples": {
                "get": get_example,
                "post": {
                    "url": format!("{base}/proxy"),
                    "headers": post_headers,
                    "body": { "url": "https://api.example.com/data", "data": "your data" },
                },
            },
        },
        "rateLimit": {
            "enabled": config.rate_limit.enabled,
            "window": format!("{} minutes", config.rate_limit.window_ms as f64 / 60_000.0),
            "max": config.rate_limit.max_requests,
        },
        "adminEndpoints": admin_endpoints,
    }))
}

async fn not_found_handler(method: Method, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Endpoint not found",
            "availableEndpoints": ["/proxy", "/health", "/docs"],
            "method": method.as_str(),
            "path": uri.path(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn server(config: ProxyConfig) -> HttpServer {
        HttpServer::new(config).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_request_id() {
        let router = server(ProxyConfig::default()).router();
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert!(body.get("config").is_none());
    }

    #[tokio::test]
    async fn test_caller_request_id_is_kept() {
        let router = server(ProxyConfig::default()).router();
        let response = router
            .oneshot(
                Request::get("/health")
                    .header("x-request-id", "caller-chosen-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "caller-chosen-id");
    }

    #[tokio::test]
    async fn test_health_includes_config_when_enabled() {
        let mut config = ProxyConfig::default();
        config.observability.include_config = true;
        let router = server(config).router();
        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["config"]["rateLimitMax"], 1000);
    }

    #[tokio::test]
    async fn test_not_found_fallback() {
        let router = server(ProxyConfig::default()).router();
        let response = router
            .oneshot(Request::delete("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Endpoint not found");
        assert_eq!(body["method"], "DELETE");
        assert_eq!(body["path"], "/nope");
    }

    #[tokio::test]
    async fn test_origin_allow_list() {
        let mut config = ProxyConfig::default();
        config.origins.allowed = vec!["https://app.example".into()];
        let router = server(config).router();

        let request = |origin: Option<&str>| {
            let mut builder = Request::get("/health");
            if let Some(origin) = origin {
                builder = builder.header("origin", origin);
            }
            builder.body(Body::empty()).unwrap()
        };

        let response = router.clone().oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(request(Some("https://app.example")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(request(Some("https://evil.example")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(
            response.headers()["access-control-allow-methods"],
            "GET,POST,PUT,PATCH,DELETE,OPTIONS,HEAD"
        );
        let body = json_body(response).await;
        assert_eq!(body["error"], "Origin not allowed");
        assert_eq!(body["origin"], "https://evil.example");
    }

    #[tokio::test]
    async fn test_any_origin_by_default() {
        let router = server(ProxyConfig::default()).router();
        let response = router
            .oneshot(
                Request::get("/health")
                    .header("origin", "https://anywhere.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_security_headers_can_be_disabled() {
        let mut config = ProxyConfig::default();
        config.security.enable_headers = false;
        let router = server(config).router();
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(!response.headers().contains_key("x-frame-options"));
    }

    #[tokio::test]
    async fn test_docs_reflect_auth() {
        let mut config = ProxyConfig::default();
        config.auth.proxy_api_key = Some("k".into());
        let router = server(config).router();
        let response = router
            .oneshot(
                Request::get("/docs")
                    .header("host", "gw.local")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["usage"]["authentication"]["required"], true);
        assert_eq!(
            body["usage"]["examples"]["get"],
            "http://gw.local/proxy?url=https://api.example.com/data&apiKey=YOUR_API_KEY"
        );
        assert!(body["adminEndpoints"].is_string());
    }
}
