//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the CORS gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Forwarding behaviour (timeouts, body limits, debug output, block-list seed).
    pub proxy: ForwardConfig,

    /// Shared secrets for the proxy and admin gates.
    pub auth: AuthConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Usage statistics bounds and maintenance cadence.
    pub stats: StatsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub security: SecurityConfig,

    /// Browser origins allowed to use the gateway.
    pub origins: OriginsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4000".to_string(),
        }
    }
}

/// Settings for the forwarding pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Deadline for the upstream response headers, and then for each gap between body chunks.
    pub request_timeout_ms: u64,

    /// TCP/TLS connect timeout for the outbound client.
    pub connect_timeout_ms: u64,

    /// Maximum inbound body size in bytes, counted on received bytes.
    pub max_body_size: usize,

    /// Maximum number of redirects followed per outbound call.
    pub max_redirects: usize,

    /// Attach `X-Proxy-Target`, `X-Proxy-Status` and `X-Proxy-Time` to relayed responses.
    pub debug_headers: bool,

    /// Include the error source chain in failure bodies.
    pub debug_errors: bool,

    /// Initial block-list. Runtime changes are never written back.
    pub blocked_domains: Vec<String>,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            max_body_size: 10 * 1024 * 1024, // 10MB
            max_redirects: 10,
            debug_headers: false,
            debug_errors: false,
            blocked_domains: Vec::new(),
        }
    }
}

/// Shared secrets. `None` disables the corresponding gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Key required on `/proxy` (X-API-Key, Bearer token or `apiKey` query).
    pub proxy_api_key: Option<String>,

    /// Key required on `/admin/*` (X-Admin-Key or `adminKey` query).
    pub admin_api_key: Option<String>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Window length in milliseconds.
    pub window_ms: u64,

    /// Maximum requests per client IP per window.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 15 * 60 * 1000,
            max_requests: 1000,
        }
    }
}

/// Bounds for the in-memory usage statistics.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Capacity of the recent-error ring buffer.
    pub recent_error_capacity: usize,

    /// Domain table size that triggers an immediate trim.
    pub domain_soft_cap: usize,

    /// Number of domains kept (by count) when the table is trimmed.
    pub domain_retain: usize,

    /// Interval of the background maintenance task in seconds.
    pub maintenance_interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            recent_error_capacity: 50,
            domain_soft_cap: 1000,
            domain_retain: 500,
            maintenance_interval_secs: 5 * 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Expose a configuration summary on the health endpoint.
    pub include_config: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            include_config: false,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security response headers.
    pub enable_headers: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
        }
    }
}

/// Origin allow-list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginsConfig {
    /// Exact `Origin` values, or `"*"` for any. Requests without an `Origin` always pass.
    pub allowed: Vec<String>,
}

impl Default for OriginsConfig {
    fn default() -> Self {
        Self {
            allowed: vec!["*".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:4000");
        assert_eq!(config.proxy.request_timeout_ms, 30_000);
        assert_eq!(config.proxy.max_body_size, 10 * 1024 * 1024);
        assert_eq!(config.stats.recent_error_capacity, 50);
        assert_eq!(config.stats.maintenance_interval_secs, 300);
        assert!(config.auth.proxy_api_key.is_none());
        assert!(config.rate_limit.enabled);
        assert_eq!(config.origins.allowed, vec!["*".to_string()]);
    }

    #[test]
    fn test_partial_toml() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [proxy]
            request_timeout_ms = 5000
            blocked_domains = ["evil.example"]

            [auth]
            admin_api_key = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.proxy.request_timeout_ms, 5000);
        assert_eq!(config.proxy.blocked_domains, vec!["evil.example".to_string()]);
        assert_eq!(config.auth.admin_api_key.as_deref(), Some("secret"));
        // Untouched fields keep their defaults
        assert_eq!(config.proxy.max_redirects, 10);
        assert_eq!(config.listener.bind_address, "0.0.0.0:4000");
    }
}
