//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::Path,
    http::{HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use futures_util::{stream, StreamExt};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use cors_proxy::config::ProxyConfig;
use cors_proxy::http::HttpServer;
use cors_proxy::lifecycle::Shutdown;

/// Exact body served by `/json`, including its odd spacing.
pub const JSON_FIXTURE: &str = "{\"items\": [1, 2, 3],  \"name\":\"fixture\", \"nested\": {\"ok\": true}}";

/// Start a mock upstream on an ephemeral port.
///
/// - `GET /json` returns [`JSON_FIXTURE`] with cookie and CORS headers the gateway must rewrite
/// - `ANY /echo` returns the request body unchanged with the same content type
/// - `ANY /inspect` describes the received method, headers and body as JSON
/// - `GET /status/{code}` returns an empty body with that status
/// - `GET /slow` answers after three seconds
/// - `GET /redirect` answers 302 pointing at `/json`
/// - `GET /stall` sends its headers and one chunk, then never finishes the body
pub async fn start_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/json", get(json_fixture))
        .route("/redirect", get(redirect))
        .route("/stall", get(stall))
        .route("/echo", any(echo))
        .route("/inspect", any(inspect))
        .route("/status/{code}", get(status))
        .route("/slow", get(slow));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn json_fixture() -> impl IntoResponse {
    (
        [
            ("content-type", "application/json"),
            ("set-cookie", "session=secret"),
            ("access-control-allow-origin", "https://only-upstream.example"),
            ("x-upstream", "yes"),
        ],
        JSON_FIXTURE,
    )
}

async fn echo(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    ([("content-type", content_type)], body)
}

async fn inspect(method: Method, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let mut seen = Map::new();
    for (name, value) in &headers {
        seen.insert(
            name.as_str().to_string(),
            Value::String(value.to_str().unwrap_or_default().to_string()),
        );
    }
    Json(json!({
        "method": method.as_str(),
        "headers": seen,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(3)).await;
    "finally"
}

async fn redirect() -> impl IntoResponse {
    (StatusCode::FOUND, [("location", "/json")])
}

async fn stall() -> impl IntoResponse {
    let first = stream::once(async { Ok::<_, std::io::Error>(Bytes::from_static(b"partial")) });
    (
        [("content-type", "text/plain")],
        Body::from_stream(first.chain(stream::pending())),
    )
}

/// An address nothing listens on.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// A raw TCP backend that reads the request and closes without answering.
pub async fn start_hangup_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;
                        drop(socket);
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// A raw TCP backend that announces a 100-byte body, sends part of it and closes.
pub async fn start_truncating_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 100\r\n\r\npartial")
                    .await;
                let _ = socket.flush().await;
                drop(socket);
            });
        }
    });
    addr
}

/// Config suited to tests: loopback bind, no rate limit, short timeouts.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.rate_limit.enabled = false;
    config.proxy.request_timeout_ms = 10_000;
    config.proxy.connect_timeout_ms = 2_000;
    config
}

/// Start the gateway on an ephemeral port. Keep the returned [`Shutdown`]
/// alive for as long as the gateway should run.
pub async fn spawn_gateway(config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// `http://<gateway>/proxy?url=<target>` with the target percent-encoded.
pub fn proxy_url(gateway: SocketAddr, target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("http://{gateway}/proxy?url={encoded}")
}
