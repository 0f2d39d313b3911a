//! Analyze Routes
//!
//! 定义票据分析相关的 API 路由。

use axum::{Router, routing::post};

use crate::api::app_state::AppState;
use crate::api::handlers::analyze_handler::*;

/// 创建分析路由器
pub fn create_analyze_router() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze_quick))
        .route("/analyze/image", post(analyze_image))
        .route("/analyze/base64", post(analyze_base64))
}
