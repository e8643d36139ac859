//! Video generation engine
//!
//! Same submit-and-poll skeleton as images with the video job type and
//! the clip parameters forwarded in the model config. Terminal statuses
//! carry `video_urls`; some pipelines report through `image_urls`, which
//! is used as the fallback.

use serde_json::json;
use tracing::{info, warn};

use crate::catalog;
use crate::error::{AppError, AppResult};
use crate::openai::{now_unix, GenerationData, GenerationResponse, VideosRequest};
use crate::upstream::classify;
use crate::AppState;

use super::extract_submission;
use super::images::{apply_fault, poll_task_urls};

const VIDEO_TYPE: &str = "COPILOT_MOA_VIDEO";

/// Run one video generation request to completion.
pub async fn generate(state: &AppState, req: &VideosRequest) -> AppResult<GenerationResponse> {
    let model = catalog::dealias(&req.model);
    let max_retries = state.pool.available_count().max(1);
    let mut cookie = state.pool.random()?;

    for _attempt in 0..max_retries {
        let mut body = build_body(state, req, &model).await?;
        if let Some(token) = state.antibot.fetch_token(&cookie).await {
            body["g_recaptcha_token"] = json!(token);
        }

        let text = state.upstream.ask(&cookie, &body).await?;

        let event = classify(&text);
        if event.credential_fault().is_some() {
            apply_fault(state, &cookie, &event);
        } else {
            if let Some(fatal) = event.fatal() {
                return Err(fatal);
            }

            let (project_id, task_ids) = extract_submission(&text);
            if task_ids.is_empty() {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "No valid task IDs received"
                )));
            }

            let urls = poll_task_urls(state, &cookie, &task_ids, true).await?;
            if !urls.is_empty() {
                if state.config.auto_delete {
                    state
                        .delete_only_cleanup_context()
                        .schedule(&cookie, &model, &project_id);
                }
                info!(count = urls.len(), "video generation finished");
                return Ok(GenerationResponse {
                    created: now_unix(),
                    data: urls
                        .into_iter()
                        .map(|url| GenerationData {
                            url: Some(url),
                            b64_json: None,
                            revised_prompt: req.prompt.clone(),
                        })
                        .collect(),
                });
            }
            warn!("no video URLs received, retrying with next credential");
        }

        cookie = state
            .pool
            .next()
            .map_err(|_| AppError::AllCredentialsUnavailable)?;
    }

    Err(AppError::AllCredentialsUnavailable)
}

/// Shape the submission body.
async fn build_body(
    state: &AppState,
    req: &VideosRequest,
    model: &str,
) -> AppResult<serde_json::Value> {
    let messages = match &req.image {
        Some(image) if !image.is_empty() => {
            match crate::chat::preprocess::base_image_data_url(&state.upstream, image).await? {
                Some(data_url) => json!([{
                    "role": "user",
                    "content": [
                        {"type": "image_url", "image_url": {"url": data_url}},
                        {"type": "text", "text": req.prompt},
                    ],
                }]),
                None => json!([{ "role": "user", "content": req.prompt }]),
            }
        }
        _ => json!([{ "role": "user", "content": req.prompt }]),
    };

    Ok(json!({
        "type": VIDEO_TYPE,
        "current_query_string": format!("type={VIDEO_TYPE}"),
        "messages": messages,
        "user_s_input": req.prompt,
        "action_params": {},
        "extra_data": {
            "model_configs": [{
                "model": model,
                "aspect_ratio": req.aspect_ratio.as_deref().unwrap_or("auto"),
                "duration": req.duration.unwrap_or(5),
                "auto_prompt": req.auto_prompt,
            }],
            "writingContent": null,
        },
    }))
}
