use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::http::response::json_error;
use crate::http::server::AppState;
use crate::observability::StatsSnapshot;
use crate::security::BlocklistError;

const RUNTIME_ONLY_NOTE: &str =
    "This change is kept in memory only and will be lost on restart. Update the configuration for persistence.";

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

pub async fn reset_stats(State(state): State<AppState>) -> Json<Value> {
    state.stats.reset();
    tracing::info!("Usage statistics reset");
    Json(json!({
        "message": "Statistics reset successfully",
        "timestamp": crate::timestamp(),
    }))
}

/// Effective configuration with secrets reduced to enabled flags.
pub async fn get_config(State(state): State<AppState>) -> Json<Value> {
    let config = state.config.load_full();
    let blocked = state.blocklist.list();

    Json(json!({
        "configuration": {
            "bindAddress": config.listener.bind_address,
            "maxBodySize": config.proxy.max_body_size,
            "rateLimitEnabled": config.rate_limit.enabled,
            "rateLimitWindow": format!("{}ms", config.rate_limit.window_ms),
            "rateLimitMax": config.rate_limit.max_requests,
            "requestTimeout": format!("{}ms", config.proxy.request_timeout_ms),
            "connectTimeout": format!("{}ms", config.proxy.connect_timeout_ms),
            "maxRedirects": config.proxy.max_redirects,
            "blockedDomains": blocked,
            "allowedOrigins": config.origins.allowed,
            "debugHeaders": config.proxy.debug_headers,
            "debugErrors": config.proxy.debug_errors,
            "adminEnabled": config.auth.admin_api_key.is_some(),
            "proxyAuthEnabled": config.auth.proxy_api_key.is_some(),
            "metricsEnabled": config.observability.metrics_enabled,
        },
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Pull `domain` out of a JSON or form body.
fn domain_from_body(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/x-www-form-urlencoded"));

    let domain = if is_form {
        url::form_urlencoded::parse(body)
            .find(|(key, _)| key == "domain")
            .map(|(_, value)| value.into_owned())
    } else {
        serde_json::from_slice::<Value>(body)
            .ok()?
            .get("domain")?
            .as_str()
            .map(str::to_string)
    };

    domain.filter(|d| !d.trim().is_empty())
}

fn blocklist_error(state: &AppState, err: BlocklistError) -> Response {
    json_error(
        err.status_code(),
        &err.to_string(),
        json!({
            "domain": err.domain(),
            "currentlyBlocked": state.blocklist.list(),
        }),
    )
}

pub async fn block_domain(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(domain) = domain_from_body(&headers, &body) else {
        return json_error(StatusCode::BAD_REQUEST, "Domain is required", json!({}));
    };

    match state.blocklist.add_domain(&domain) {
        Ok(current) => {
            tracing::info!(domain = %domain, "Domain blocked");
            Json(json!({
                "message": "Domain blocked successfully (runtime only)",
                "domain": domain.trim().to_ascii_lowercase(),
                "note": RUNTIME_ONLY_NOTE,
                "currentlyBlocked": current,
            }))
            .into_response()
        }
        Err(err) => blocklist_error(&state, err),
    }
}

pub async fn unblock_domain(State(state): State<AppState>, Path(domain): Path<String>) -> Response {
    match state.blocklist.remove_domain(&domain) {
        Ok(current) => {
            tracing::info!(domain = %domain, "Domain unblocked");
            Json(json!({
                "message": "Domain unblocked successfully (runtime only)",
                "domain": domain.trim().to_ascii_lowercase(),
                "note": RUNTIME_ONLY_NOTE,
                "currentlyBlocked": current,
            }))
            .into_response()
        }
        Err(err) => blocklist_error(&state, err),
    }
}
