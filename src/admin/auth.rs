use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use serde_json::json;

use crate::http::request::query_param;
use crate::http::response::json_error;
use crate::http::server::AppState;
use crate::security::auth::key_matches;

pub const X_ADMIN_KEY: &str = "x-admin-key";

/// Guards `/admin/*`. Answers 501 while no admin key is configured.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.load_full();
    let Some(expected) = config.auth.admin_api_key.as_deref() else {
        return json_error(
            StatusCode::NOT_IMPLEMENTED,
            "Admin functionality not configured",
            json!({ "message": "admin_api_key is not set" }),
        );
    };

    let provided = request
        .headers()
        .get(X_ADMIN_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query_param(request.uri(), "adminKey"));

    if key_matches(expected, provided.as_deref()) {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Rejected admin request");
    json_error(
        StatusCode::UNAUTHORIZED,
        "Unauthorized",
        json!({
            "message": "Valid admin key required. Provide via X-Admin-Key header or adminKey query parameter"
        }),
    )
}
