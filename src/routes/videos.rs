//! Video generations endpoint

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::{error::AppError, media, openai::{GenerationResponse, VideosRequest}, AppState};

/// Handle `POST /v1/videos/generations`.
pub async fn videos_generations(
    State(state): State<Arc<AppState>>,
    request: axum::extract::Request,
) -> Result<Json<GenerationResponse>, AppError> {
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to read request body: {e}")))?;
    let request: VideosRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?;

    if request.prompt.trim().is_empty() {
        return Err(AppError::BadRequest("prompt must not be empty".into()));
    }
    let response = media::videos::generate(&state, &request).await?;
    Ok(Json(response))
}
