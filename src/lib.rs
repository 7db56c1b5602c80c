//! CORS forwarding gateway library.
//!
//! Accepts browser requests on `/proxy`, forwards them to the target named in
//! the `url` parameter, and relays the upstream response with permissive CORS
//! headers.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

/// Current UTC time as RFC 3339 with millisecond precision.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
