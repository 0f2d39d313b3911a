//! API 模块
//!
//! 提供 REST API 支持。

#[cfg(test)]
mod api_tests;
pub mod app_state;
pub mod dto;
pub mod handlers;
pub mod routes;

use crate::api::app_state::AppState;
use crate::observability::metrics_middleware;
use crate::security::middleware::{api_key_middleware, cors_layer, security_headers_middleware};
use axum::{Router, extract::DefaultBodyLimit, middleware};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

pub fn create_router(app_state: AppState) -> Router {
    // 除探活与指标外的路由都需要 API key
    let protected = Router::new()
        .merge(routes::analyze_routes::create_analyze_router())
        .merge(routes::prompt_routes::create_prompt_router())
        .merge(routes::analysis_routes::create_analysis_router())
        .route_layer(middleware::from_fn_with_state(
            app_state.authenticator.clone(),
            api_key_middleware,
        ));

    Router::new()
        .merge(routes::health_routes::create_health_router())
        .merge(protected)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(
            app_state.config.server.max_request_size,
        ))
        .layer(middleware::from_fn_with_state(
            app_state.metrics.clone(),
            metrics_middleware,
        ))
        // Add security headers middleware to all routes
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&app_state.config.security))
        .with_state(app_state)
}
