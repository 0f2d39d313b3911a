use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

use crate::{
    api::app_state::AppState,
    observability::{HealthCheck, HealthStatus},
    services::prompt_store::{PromptKind, PromptSource},
};

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub health: HealthStatus,
    pub model: String,
    pub system_prompt: PromptSources,
    pub venue_profiles: usize,
    pub auth_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct PromptSources {
    pub active: PromptSource,
    pub quick: PromptSource,
}

pub async fn root() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = Vec::with_capacity(2);

    let started = Instant::now();
    checks.push(match state.repository.count().await {
        Ok(count) => HealthCheck::healthy(
            "storage",
            format!("{} ({} analyses)", state.repository.backend(), count),
            started.elapsed().as_millis() as u64,
        ),
        Err(e) => HealthCheck::unhealthy("storage", e.to_string()),
    });

    let venue_profiles = state.analyzer.venue_count().await;
    checks.push(HealthCheck::healthy(
        "venue_profiles",
        format!("{} profiles", venue_profiles),
        0,
    ));

    let health = HealthStatus::from_checks(
        env!("CARGO_PKG_VERSION"),
        state.uptime_seconds(),
        checks,
    );
    let status_code = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        health,
        model: state.config.openai.model_extract.clone(),
        system_prompt: PromptSources {
            active: state.prompt_store.source(PromptKind::Active).await,
            quick: state.prompt_store.source(PromptKind::Quick).await,
        },
        venue_profiles,
        auth_enabled: state.authenticator.is_enabled(),
    };

    (status_code, Json(response))
}

/// Prometheus 指标端点
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.gather(),
    )
}
