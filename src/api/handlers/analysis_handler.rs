use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::analysis_dto::*},
    error::AppError,
};

pub async fn list_analyses(
    State(state): State<AppState>,
    Query(params): Query<ListAnalysesParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.effective_limit();
    debug!("Listing analyses: limit={}", limit);

    let items = state.repository.list_analyses(limit).await?;
    let total = state.repository.count().await?;

    Ok(Json(AnalysisListResponse {
        items,
        limit,
        total,
    }))
}

pub async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Getting analysis: {}", id);

    let record = state
        .repository
        .get_analysis(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Analysis {} not found", id)))?;

    Ok(Json(record))
}

pub async fn reload_venues(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let path = &state.config.data.venue_profiles_path;
    debug!("Reloading venue profiles from {}", path.display());

    let profiles = state
        .analyzer
        .reload_venues(path, state.config.validation.profile_match_threshold)
        .await?;

    Ok(Json(VenueReloadResponse { profiles }))
}
