//! Health Routes
//!
//! 无需认证的探活与指标路由。

use axum::{Router, routing::get};

use crate::api::app_state::AppState;
use crate::api::handlers::health_handler::*;

pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
}
