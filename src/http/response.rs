//! JSON responses shared by the non-forwarding endpoints.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// `{error, timestamp}` plus any extra fields of `context` (an object).
pub fn json_error(status: StatusCode, error: &str, context: Value) -> Response {
    let mut body = json!({
        "error": error,
        "timestamp": crate::timestamp(),
    });
    if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), context) {
        body.extend(extra);
    }
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_error_merges_context() {
        let response = json_error(StatusCode::CONFLICT, "Domain already blocked", json!({"domain": "a.example"}));
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Domain already blocked");
        assert_eq!(body["domain"], "a.example");
        assert!(body["timestamp"].is_string());
    }
}
