//! Admin API: usage statistics, effective configuration and runtime
//! block-list management. Every route sits behind the admin key.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(get_stats))
        .route("/admin/reset-stats", post(reset_stats))
        .route("/admin/config", get(get_config))
        .route("/admin/block-domain", post(block_domain))
        .route("/admin/unblock-domain/{domain}", delete(unblock_domain))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
