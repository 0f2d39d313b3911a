//! Routes 模块
//!
//! 定义 API 路由。

pub mod analysis_routes;
pub mod analyze_routes;
pub mod health_routes;
pub mod prompt_routes;
