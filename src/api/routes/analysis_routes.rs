//! Analysis Routes
//!
//! 定义分析记录查询与场所档案管理的 API 路由。

use axum::{
    Router,
    routing::{get, post},
};

use crate::api::app_state::AppState;
use crate::api::handlers::analysis_handler::*;

/// 创建分析记录路由器
pub fn create_analysis_router() -> Router<AppState> {
    Router::new()
        .route("/analyses", get(list_analyses))
        .route("/analyses/:id", get(get_analysis))
        .route("/venues/reload", post(reload_venues))
}
