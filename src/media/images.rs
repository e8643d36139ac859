//! Image generation engine
//!
//! Submit on the ask endpoint, read the project id and task ids out of
//! the response, then poll the task status stream until every task
//! reports. Credential faults rotate exactly like chat. When pinned image
//! sessions are configured, the retry loop walks those (cookie, project)
//! pairs instead of the pool.

use base64::Engine;
use futures::StreamExt;
use serde_json::json;
use tracing::{info, warn};

use crate::catalog;
use crate::error::{AppError, AppResult};
use crate::openai::{now_unix, GenerationData, GenerationResponse, ImagesRequest};
use crate::upstream::{classify, UpstreamEvent};
use crate::AppState;

use super::{collect_success_urls, extract_submission};

const IMAGE_TYPE: &str = "COPILOT_MOA_IMAGE";

/// Run one image generation request to completion.
pub async fn generate(state: &AppState, req: &ImagesRequest) -> AppResult<GenerationResponse> {
    let model = catalog::dealias(&req.model);

    let pinned: Vec<(String, String)> = state
        .config
        .image_sessions
        .iter()
        .map(|(cookie, id)| (cookie.clone(), id.clone()))
        .collect();

    let max_retries = if pinned.is_empty() {
        state.pool.available_count().max(1)
    } else {
        pinned.len()
    };

    let mut index = 0usize;
    let (mut cookie, mut chat_id) = if pinned.is_empty() {
        (state.pool.random()?, None)
    } else {
        let (cookie, id) = pinned[0].clone();
        (cookie, Some(id))
    };

    for _attempt in 0..max_retries {
        let mut body = build_body(state, req, &model, chat_id.as_deref()).await?;
        if let Some(token) = state.antibot.fetch_token(&cookie).await {
            body["g_recaptcha_token"] = json!(token);
        }

        let text = state.upstream.ask(&cookie, &body).await?;

        match classify(&text) {
            event if event.credential_fault().is_some() => {
                apply_fault(state, &cookie, &event);
            }
            event => {
                if let Some(fatal) = event.fatal() {
                    return Err(fatal);
                }

                let (project_id, task_ids) = extract_submission(&text);
                if task_ids.is_empty() {
                    warn!(body = %text.chars().take(200).collect::<String>(), "no task ids in submission");
                    return Err(AppError::Internal(anyhow::anyhow!(
                        "No valid task IDs received"
                    )));
                }

                let urls = poll_task_urls(state, &cookie, &task_ids, false).await?;
                if !urls.is_empty() {
                    if state.config.auto_delete {
                        state
                            .delete_only_cleanup_context()
                            .schedule(&cookie, &model, &project_id);
                    }
                    info!(count = urls.len(), "image generation finished");
                    return build_response(state, req, urls).await;
                }
                warn!("no image URLs received, retrying with next credential");
            }
        }

        index += 1;
        if pinned.is_empty() {
            cookie = state
                .pool
                .next()
                .map_err(|_| AppError::AllCredentialsUnavailable)?;
        } else {
            if index >= pinned.len() {
                break;
            }
            let (next_cookie, next_id) = pinned[index].clone();
            cookie = next_cookie;
            chat_id = Some(next_id);
        }
    }

    Err(AppError::AllCredentialsUnavailable)
}

/// Shape the submission body.
async fn build_body(
    state: &AppState,
    req: &ImagesRequest,
    model: &str,
    chat_id: Option<&str>,
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

    let query_string = match chat_id {
        Some(id) => format!("id={id}&type={IMAGE_TYPE}"),
        None => format!("type={IMAGE_TYPE}"),
    };

    Ok(json!({
        "type": IMAGE_TYPE,
        "current_query_string": query_string,
        "messages": messages,
        "user_s_input": req.prompt,
        "action_params": {},
        "extra_data": {
            "model_configs": [{
                "model": model,
                "aspect_ratio": "auto",
                "use_personalized_models": false,
                "fashion_profile_id": null,
                "hd": false,
                "reflection_enabled": false,
                "style": "auto",
            }],
            "llm_model": "gpt-4o",
            "imageModelMap": {},
            "writingContent": null,
        },
    }))
}

pub(crate) fn apply_fault(state: &AppState, cookie: &str, event: &UpstreamEvent) {
    use crate::upstream::CredentialFault;
    use std::time::Duration;
    match event.credential_fault() {
        Some(CredentialFault::RateLimited) => state.pool.cooldown(
            cookie,
            Duration::from_secs(state.config.rate_limit_cooldown_secs),
        ),
        Some(CredentialFault::FreeQuotaExhausted) => {
            state.pool.cooldown(cookie, Duration::from_secs(24 * 60 * 60))
        }
        Some(CredentialFault::NotLoggedIn) => state.pool.remove(cookie),
        None => {}
    }
}

/// Read the task status stream until the terminal event, then collect
/// SUCCESS URLs in task order.
pub(crate) async fn poll_task_urls(
    state: &AppState,
    cookie: &str,
    task_ids: &[String],
    prefer_video: bool,
) -> AppResult<Vec<String>> {
    let mut lines = state.upstream.task_status_stream(cookie, task_ids).await?;
    while let Some(line) = lines.next().await {
        let line = line?;
        if let UpstreamEvent::TasksStatusComplete { final_status } = classify(&line) {
            return Ok(collect_success_urls(&final_status, task_ids, prefer_video));
        }
    }
    Ok(Vec::new())
}

/// Assemble the client payload, inlining base64 when requested.
async fn build_response(
    state: &AppState,
    req: &ImagesRequest,
    urls: Vec<String>,
) -> AppResult<GenerationResponse> {
    let mut data = Vec::with_capacity(urls.len());
    for url in urls {
        if req.wants_base64() {
            match state.upstream.fetch_bytes(&url).await {
                Ok(bytes) => {
                    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                    data.push(GenerationData {
                        url: None,
                        b64_json: Some(format!("data:image/webp;base64,{encoded}")),
                        revised_prompt: req.prompt.clone(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, "image download for base64 failed");
                    continue;
                }
            }
        } else {
            data.push(GenerationData {
                url: Some(url),
                b64_json: None,
                revised_prompt: req.prompt.clone(),
            });
        }
    }
    Ok(GenerationResponse {
        created: now_unix(),
        data,
    })
}
