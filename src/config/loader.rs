//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a TOML file, overlay the environment and validate the result.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Same as [`load_config`] with an explicit variable lookup.
pub fn load_config_with<F>(path: &Path, lookup: F) -> Result<ProxyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let content = fs::read_to_string(path)?;
    let mut config: ProxyConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, lookup);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Built-in defaults overlaid with the environment, for runs without a config file.
pub fn load_from_env() -> Result<ProxyConfig, ConfigError> {
    let mut config = ProxyConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay the gateway's environment variables on `config`.
///
/// `lookup` abstracts `std::env::var` so callers can inject a fixed map.
/// Unparsable numeric values are logged and ignored.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        match port.trim().parse::<u16>() {
            Ok(port) => config.listener.bind_address = format!("0.0.0.0:{port}"),
            Err(_) => tracing::warn!(value = %port, "Ignoring invalid PORT"),
        }
    }

    if let Some(value) = lookup("REQUEST_TIMEOUT") {
        match value.trim().parse() {
            Ok(ms) => config.proxy.request_timeout_ms = ms,
            Err(_) => tracing::warn!(value = %value, "Ignoring invalid REQUEST_TIMEOUT"),
        }
    }

    if let Some(value) = lookup("MAX_BODY_SIZE") {
        match parse_size(&value) {
            Some(bytes) => config.proxy.max_body_size = bytes,
            None => tracing::warn!(value = %value, "Ignoring invalid MAX_BODY_SIZE"),
        }
    }

    if let Some(value) = lookup("RATE_LIMIT_WINDOW") {
        match value.trim().parse() {
            Ok(ms) => config.rate_limit.window_ms = ms,
            Err(_) => tracing::warn!(value = %value, "Ignoring invalid RATE_LIMIT_WINDOW"),
        }
    }

    if let Some(value) = lookup("RATE_LIMIT_MAX") {
        match value.trim().parse() {
            Ok(max) => config.rate_limit.max_requests = max,
            Err(_) => tracing::warn!(value = %value, "Ignoring invalid RATE_LIMIT_MAX"),
        }
    }

    if let Some(value) = lookup("BLOCKED_DOMAINS") {
        config.proxy.blocked_domains = split_list(&value);
    }

    if let Some(value) = lookup("ALLOWED_ORIGINS") {
        config.origins.allowed = split_list(&value);
    }

    if let Some(key) = lookup("PROXY_API_KEY").filter(|k| !k.is_empty()) {
        config.auth.proxy_api_key = Some(key);
    }
    if let Some(key) = lookup("ADMIN_API_KEY").filter(|k| !k.is_empty()) {
        config.auth.admin_api_key = Some(key);
    }

    if let Some(value) = lookup("DEBUG_HEADERS") {
        config.proxy.debug_headers = value == "true";
    }
    if let Some(value) = lookup("DEBUG_ERRORS") {
        config.proxy.debug_errors = value == "true";
    }
    if let Some(value) = lookup("INCLUDE_CONFIG") {
        config.observability.include_config = value == "true";
    }
}

/// Comma-separated values, trimmed, empty entries dropped.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a human size such as `10mb`, `512kb`, `1gb` or a plain byte count.
pub fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim().to_ascii_lowercase();
    let (digits, multiplier) = if let Some(n) = value.strip_suffix("gb") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = value.strip_suffix("mb") {
        (n, 1024 * 1024)
    } else if let Some(n) = value.strip_suffix("kb") {
        (n, 1024)
    } else if let Some(n) = value.strip_suffix('b') {
        (n, 1)
    } else {
        (value.as_str(), 1)
    };

    digits.trim().parse::<usize>().ok()?.checked_mul(multiplier)
}
