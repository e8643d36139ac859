//! Chat completions endpoint
//!
//! OpenAI-compatible chat completions, streaming and non-streaming. The
//! body is parsed by hand so malformed JSON surfaces in the same error
//! shape as everything else; all real work happens in the execution
//! engine.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, response::Response};
use tracing::info;

use crate::{chat::engine, error::AppError, openai::ChatCompletionRequest, AppState};

/// Handle `POST /v1/chat/completions`.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    request: axum::extract::Request,
) -> Result<Response, AppError> {
    let started = Instant::now();

    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to read request body: {e}")))?;
    let chat_request: ChatCompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?;
    let model = chat_request.model.clone();

    let response = engine::handle_chat(state, chat_request).await?;

    info!(
        model = %model,
        duration_ms = %format!("{:.1}", started.elapsed().as_secs_f64() * 1000.0),
        "chat completion dispatched"
    );
    Ok(response)
}
