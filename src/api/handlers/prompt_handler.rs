use axum::{
    Json,
    extract::{Path, State, rejection::PathRejection},
    response::IntoResponse,
};
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::prompt_dto::*},
    error::AppError,
    services::prompt_store::PromptKind,
};

pub async fn get_prompt(
    State(state): State<AppState>,
    kind: Result<Path<PromptKind>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let kind = prompt_kind(kind)?;
    debug!("Reading {} prompt", kind);

    let system_prompt = state.prompt_store.get(kind).await;
    let source = state.prompt_store.source(kind).await;

    Ok(Json(PromptResponse {
        kind,
        system_prompt,
        source,
    }))
}

pub async fn set_prompt(
    State(state): State<AppState>,
    kind: Result<Path<PromptKind>, PathRejection>,
    Json(request): Json<SetPromptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let kind = prompt_kind(kind)?;
    debug!(
        "Updating {} prompt ({} chars)",
        kind,
        request.system_prompt.chars().count()
    );

    let version = state.prompt_store.set(kind, &request.system_prompt).await?;

    Ok(Json(SetPromptResponse {
        message: "Prompt updated".to_string(),
        version,
    }))
}

/// 路径中的提示词种类只接受 `active` / `quick`
fn prompt_kind(path: Result<Path<PromptKind>, PathRejection>) -> Result<PromptKind, AppError> {
    path.map(|Path(kind)| kind)
        .map_err(|e| AppError::Validation(format!("未知的提示词种类: {}", e.body_text())))
}
