//! Prompt Routes

use axum::{Router, routing::get};

use crate::api::app_state::AppState;
use crate::api::handlers::prompt_handler::*;

/// 创建提示词路由器，`:kind` 为 `active` 或 `quick`
pub fn create_prompt_router() -> Router<AppState> {
    Router::new().route("/prompts/:kind", get(get_prompt).post(set_prompt))
}
