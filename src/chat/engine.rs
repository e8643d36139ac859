//! Chat execution engine
//!
//! One turn: shape the request, pick a credential, drive the upstream
//! stream, translate events, retry on credential faults. The retry bound
//! is the available pool size at entry; credential faults cool down or
//! remove the credential and rotate, fatal events terminate the turn.
//!
//! Streaming responses are produced by a detached task feeding a channel.
//! The handler waits for the first item before committing to a status
//! code, so a turn that dies before emitting anything still surfaces as a
//! plain HTTP error.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::error::{AppError, AppResult};
use crate::media;
use crate::openai::{
    finish_chunk, format_sse_chunk, format_sse_done, response_id, usage_chunk,
    ChatCompletionRequest, ChatCompletionResponse, ChoiceMessage, Delta, ImagesRequest,
    StreamChunk, ToolCallDelta, ToolCallFunctionDelta, Usage,
};
use crate::tokens;
use crate::tooluse::{self, ParseEvent, StreamParser};
use crate::upstream::{classify, CredentialFault, UpstreamEvent};
use crate::AppState;

use super::preprocess;
use super::translate::{route_field, unwrap_detail_answer, Routed, TurnAccumulator};

const CHAT_TYPE: &str = "COPILOT_MOA_CHAT";
const FREE_QUOTA_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// Entry point for `POST /v1/chat/completions`.
pub async fn handle_chat(state: Arc<AppState>, mut req: ChatCompletionRequest) -> AppResult<Response> {
    if req.messages.is_empty() {
        return Err(AppError::BadRequest("messages must not be empty".into()));
    }
    req.model = catalog::dealias(&req.model);

    // Image models answer chat requests through the generation flow.
    if catalog::is_image_model(&req.model) {
        return image_model_chat(state, req).await;
    }

    let search = req.model.ends_with("-search");
    let model = req
        .model
        .strip_suffix("-search")
        .unwrap_or(&req.model)
        .to_string();

    let cookie = state.pool.random()?;
    probe_login(state.clone(), cookie.clone());

    info!(
        model = %model,
        stream = req.stream,
        tools = req.tools.len(),
        messages = req.messages.len(),
        "chat turn started"
    );

    if req.has_tools() {
        tooluse::prepare_request(&mut req);
        let body = build_chat_body(&state, &cookie, &mut req, &model, search).await?;
        if req.stream {
            stream_response(state, cookie, model, search, body, Some(req.tools)).await
        } else {
            let response = run_unary_tool_chat(&state, cookie, &model, body, &req.tools).await?;
            Ok(Json(response).into_response())
        }
    } else {
        let body = build_chat_body(&state, &cookie, &mut req, &model, search).await?;
        if req.stream {
            stream_response(state, cookie, model, search, body, None).await
        } else {
            let response = run_unary_chat(&state, cookie, &model, search, body).await?;
            Ok(Json(response).into_response())
        }
    }
}

/// Fire the login liveness probe without holding up the turn.
fn probe_login(state: Arc<AppState>, cookie: String) {
    tokio::spawn(async move {
        match state.upstream.check_login(&cookie).await {
            Ok(status) if status.is_login => {
                debug!(account = %status.cogen_email, "login check passed")
            }
            Ok(_) => warn!("login check reports credential not logged in"),
            Err(e) => warn!(error = %e, "login check failed"),
        }
    });
}

fn query_string_for(state: &AppState, cookie: &str, model: &str) -> (String, bool) {
    if let Some(id) = state.config.model_sessions.get(model) {
        return (format!("id={id}&type={CHAT_TYPE}"), true);
    }
    if let Some(id) = state.sessions.get(cookie, model) {
        return (format!("id={id}&type={CHAT_TYPE}"), true);
    }
    (format!("type={CHAT_TYPE}"), false)
}

/// Shape the upstream ask body for a chat turn.
async fn build_chat_body(
    state: &AppState,
    cookie: &str,
    req: &mut ChatCompletionRequest,
    model: &str,
    search: bool,
) -> AppResult<serde_json::Value> {
    req.rewrite_for_model(model);
    if let Some(raw) = &state.config.pre_messages {
        let raw = raw.clone();
        req.splice_pre_messages(&raw)?;
    }
    preprocess::inline_attachments(&state.upstream, cookie, &mut req.messages).await?;

    let (query_string, has_session) = query_string_for(state, cookie, model);
    // Without a session the upstream replays nothing, so resending the
    // whole history would duplicate context. Tool turns keep it: the
    // shimmed tool traffic is the context.
    if !has_session && !req.has_tools() {
        req.filter_to_last_user();
    }

    let models: Vec<String> = if catalog::is_text_model(model) {
        vec![model.to_string()]
    } else {
        catalog::MIXTURE_MODELS.iter().map(|m| m.to_string()).collect()
    };

    Ok(json!({
        "type": CHAT_TYPE,
        "current_query_string": query_string,
        "messages": req.messages,
        "action_params": {},
        "extra_data": {
            "models": models,
            "run_with_another_model": false,
            "writingContent": null,
            "request_web_knowledge": search,
        },
    }))
}

/// Refresh the anti-bot token on the body for this attempt.
async fn attach_antibot_token(state: &AppState, cookie: &str, body: &mut serde_json::Value) {
    if let Some(token) = state.antibot.fetch_token(cookie).await {
        body["g_recaptcha_token"] = json!(token);
    }
}

/// Dial the unary ask endpoint, retrying once on a transport failure.
async fn dial_ask(state: &AppState, cookie: &str, body: &serde_json::Value) -> AppResult<String> {
    match state.upstream.ask(cookie, body).await {
        Err(AppError::Transport(e)) => {
            warn!(error = %e, "ask dial failed, retrying once");
            state.upstream.ask(cookie, body).await
        }
        other => other,
    }
}

/// Dial the streaming ask endpoint, retrying once on a transport failure.
async fn dial_ask_stream(
    state: &AppState,
    cookie: &str,
    body: &serde_json::Value,
) -> AppResult<crate::upstream::client::LineStream> {
    match state.upstream.ask_stream(cookie, body).await {
        Err(AppError::Transport(e)) => {
            warn!(error = %e, "stream dial failed, retrying once");
            state.upstream.ask_stream(cookie, body).await
        }
        other => other,
    }
}

/// Apply the cooldown policy for a credential fault.
fn apply_credential_fault(state: &AppState, cookie: &str, fault: CredentialFault) {
    match fault {
        CredentialFault::RateLimited => {
            warn!("credential rate limited, cooling down");
            state.pool.cooldown(
                cookie,
                Duration::from_secs(state.config.rate_limit_cooldown_secs),
            );
        }
        CredentialFault::FreeQuotaExhausted => {
            warn!("credential free quota exhausted, cooling down for 24h");
            state.pool.cooldown(cookie, FREE_QUOTA_COOLDOWN);
        }
        CredentialFault::NotLoggedIn => {
            warn!("credential not logged in, removing from pool");
            state.pool.remove(cookie);
        }
    }
}

/// Swap in the next credential and rebuild the session query string.
fn rotate_credential(
    state: &AppState,
    body: &mut serde_json::Value,
    model: &str,
) -> AppResult<String> {
    let cookie = state.pool.next().map_err(|_| AppError::AllCredentialsUnavailable)?;
    let (query_string, _) = query_string_for(state, &cookie, model);
    body["current_query_string"] = json!(query_string);
    Ok(cookie)
}

// ---------------------------------------------------------------------------
// Non-streaming paths
// ---------------------------------------------------------------------------

/// Drive a unary chat turn, rotating on credential faults.
async fn run_unary_chat(
    state: &AppState,
    mut cookie: String,
    model: &str,
    search: bool,
    mut body: serde_json::Value,
) -> AppResult<ChatCompletionResponse> {
    let max_retries = state.pool.available_count().max(1);
    let cleanup = state.cleanup_context();

    for _attempt in 0..max_retries {
        attach_antibot_token(state, &cookie, &mut body).await;
        let prompt_tokens = tokens::estimate(&body.to_string());
        let text = dial_ask(state, &cookie, &body).await?;

        let mut acc = TurnAccumulator::default();
        let mut fault = None;

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let event = classify(line);
            if let Some(f) = event.credential_fault() {
                apply_credential_fault(state, &cookie, f);
                fault = Some(f);
                break;
            }
            if let Some(fatal) = event.fatal() {
                return Err(fatal);
            }
            match event {
                UpstreamEvent::ProjectStart { id } => acc.project_id = id,
                UpstreamEvent::MessageFieldDelta { field_name, delta } => {
                    let routed = route_field(&field_name, delta, state.config.reasoning_visible);
                    acc.apply(&routed, false);
                }
                UpstreamEvent::MessageField { field_name, value } => {
                    let routed = route_field(&field_name, value, state.config.reasoning_visible);
                    acc.apply(&routed, true);
                }
                UpstreamEvent::MessageResult { content } => {
                    cleanup.schedule(&cookie, model, &acc.project_id);
                    if acc.content.is_empty() {
                        if let Some(result_content) = content {
                            if search && state.config.is_detail_answer_model(model) {
                                if let Some(detail) = unwrap_detail_answer(&result_content) {
                                    acc.content = detail;
                                }
                            } else {
                                acc.content = result_content.trim().to_string();
                            }
                        }
                    }
                    break;
                }
                _ => {}
            }
        }

        if fault.is_none() {
            let usage = Usage::from_estimates(
                prompt_tokens,
                tokens::estimate(&acc.content),
                tokens::estimate(&acc.reasoning),
            );
            let mut message = ChoiceMessage::assistant(acc.content);
            if !acc.reasoning.is_empty() {
                message.reasoning_content = Some(acc.reasoning);
            }
            return Ok(ChatCompletionResponse::single(model, message, "stop", usage));
        }

        cookie = rotate_credential(state, &mut body, model)?;
    }

    Err(AppError::AllCredentialsUnavailable)
}

/// Drive a unary tool turn: full accumulation, then one parse.
async fn run_unary_tool_chat(
    state: &AppState,
    mut cookie: String,
    model: &str,
    mut body: serde_json::Value,
    tools: &[crate::openai::Tool],
) -> AppResult<ChatCompletionResponse> {
    let max_retries = state.pool.available_count().max(1);
    let cleanup = state.delete_only_cleanup_context();

    for _attempt in 0..max_retries {
        attach_antibot_token(state, &cookie, &mut body).await;
        let prompt_tokens = tokens::estimate(&body.to_string());
        let text = dial_ask(state, &cookie, &body).await?;

        let mut content = String::new();
        let mut project_id = String::new();
        let mut fault = None;

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let event = classify(line);
            if let Some(f) = event.credential_fault() {
                apply_credential_fault(state, &cookie, f);
                fault = Some(f);
                break;
            }
            if let Some(fatal) = event.fatal() {
                return Err(fatal);
            }
            match event {
                UpstreamEvent::ProjectStart { id } => project_id = id,
                UpstreamEvent::MessageFieldDelta { field_name, delta } => {
                    if is_tool_content_field(&field_name) {
                        content.push_str(&delta);
                    }
                }
                UpstreamEvent::MessageField { field_name, value } => {
                    if is_tool_content_field(&field_name) {
                        content = value;
                    }
                }
                UpstreamEvent::MessageResult {
                    content: result_content,
                } => {
                    cleanup.schedule(&cookie, model, &project_id);
                    if content.is_empty() {
                        if let Some(rc) = result_content {
                            content = rc.trim().to_string();
                        }
                    }
                    break;
                }
                _ => {}
            }
        }

        if fault.is_none() && !content.is_empty() {
            let completion_tokens = tokens::estimate(&content);
            let usage = Usage::from_estimates(prompt_tokens, completion_tokens, 0);

            let reply = match tooluse::parse_reply(&content) {
                Ok(reply) => reply,
                Err(e) => {
                    // The model ignored the format; hand its text back.
                    debug!(error = %e, "tool reply parse failed, returning raw text");
                    return Ok(ChatCompletionResponse::single(
                        model,
                        ChoiceMessage::assistant(content),
                        "stop",
                        usage,
                    ));
                }
            };
            tooluse::validate_reply(&reply, tools)?;

            if reply.is_tool_call() {
                let call = tooluse::to_tool_call(&reply)?;
                let mut message = ChoiceMessage::assistant("");
                message.tool_calls = Some(vec![call]);
                return Ok(ChatCompletionResponse::single(
                    model,
                    message,
                    "tool_calls",
                    usage,
                ));
            }
            return Ok(ChatCompletionResponse::single(
                model,
                ChoiceMessage::assistant(reply.content.unwrap_or_default()),
                "stop",
                usage,
            ));
        }

        cookie = rotate_credential(state, &mut body, model)?;
    }

    Err(AppError::AllCredentialsUnavailable)
}

/// Tool turns additionally accept the bare `content` field some models
/// stream their reply on.
fn is_tool_content_field(field_name: &str) -> bool {
    field_name == "session_state.answer"
        || field_name.contains("session_state.streaming_detail_answer")
        || field_name == "content"
}

// ---------------------------------------------------------------------------
// Streaming paths
// ---------------------------------------------------------------------------

type ChunkResult = Result<Bytes, AppError>;

/// Channel-backed emitter used by the streaming producers.
struct Emitter {
    tx: mpsc::Sender<ChunkResult>,
    emitted: bool,
    id: String,
    model: String,
}

impl Emitter {
    fn new(tx: mpsc::Sender<ChunkResult>, model: &str) -> Self {
        Self {
            tx,
            emitted: false,
            id: response_id(),
            model: model.to_string(),
        }
    }

    async fn chunk(&mut self, chunk: StreamChunk) -> bool {
        self.emitted = true;
        self.tx.send(Ok(format_sse_chunk(&chunk))).await.is_ok()
    }

    async fn delta(&mut self, delta: Delta) -> bool {
        let chunk = StreamChunk::delta(&self.id, &self.model, delta);
        self.chunk(chunk).await
    }

    /// Finish chunk, usage chunk, [DONE].
    async fn finish(&mut self, finish_reason: &str, usage: Usage) {
        let id = self.id.clone();
        let model = self.model.clone();
        if !self.chunk(finish_chunk(&id, &model, finish_reason)).await {
            return;
        }
        if !self.chunk(usage_chunk(&id, &model, usage)).await {
            return;
        }
        let _ = self.tx.send(Ok(format_sse_done())).await;
    }

    /// Report a turn failure. Before any output this propagates as a
    /// plain HTTP error; after, the status is already on the wire, so the
    /// error goes out as a final JSON event.
    async fn fail(&mut self, error: AppError) {
        if self.emitted {
            let body = serde_json::to_string(&error.to_body()).unwrap_or_default();
            let _ = self.tx.send(Ok(Bytes::from(format!("data: {body}\n\n")))).await;
        } else {
            let _ = self.tx.send(Err(error)).await;
        }
    }
}

/// Build the SSE response, holding the status until the first produced item.
async fn stream_response(
    state: Arc<AppState>,
    cookie: String,
    model: String,
    search: bool,
    body: serde_json::Value,
    tools: Option<Vec<crate::openai::Tool>>,
) -> AppResult<Response> {
    let (tx, mut rx) = mpsc::channel::<ChunkResult>(64);
    let emitter = Emitter::new(tx, &model);

    match tools {
        Some(_) => {
            tokio::spawn(run_stream_tool_chat(state, cookie, model, body, emitter));
        }
        None => {
            tokio::spawn(run_stream_chat(state, cookie, model, search, body, emitter));
        }
    }

    let first = match rx.recv().await {
        Some(Ok(bytes)) => bytes,
        Some(Err(error)) => return Err(error),
        None => return Err(AppError::ServerError),
    };

    let stream = async_stream::stream! {
        yield Ok::<Bytes, AppError>(first);
        while let Some(item) = rx.recv().await {
            yield item;
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {e}")))
}

/// Producer for streaming chat without tools.
async fn run_stream_chat(
    state: Arc<AppState>,
    mut cookie: String,
    model: String,
    search: bool,
    mut body: serde_json::Value,
    mut out: Emitter,
) {
    let max_retries = state.pool.available_count().max(1);
    let cleanup = state.cleanup_context();

    for _attempt in 0..max_retries {
        attach_antibot_token(&state, &cookie, &mut body).await;
        let prompt_tokens = tokens::estimate(&body.to_string());

        let mut lines = match dial_ask_stream(&state, &cookie, &body).await {
            Ok(lines) => lines,
            Err(e) => {
                out.fail(e).await;
                return;
            }
        };

        let mut acc = TurnAccumulator::default();
        let mut fault = None;

        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    out.fail(e).await;
                    return;
                }
            };
            let event = classify(&line);
            if let Some(f) = event.credential_fault() {
                apply_credential_fault(&state, &cookie, f);
                fault = Some(f);
                break;
            }
            if let Some(fatal) = event.fatal() {
                out.fail(fatal).await;
                return;
            }
            match event {
                UpstreamEvent::ProjectStart { id } => acc.project_id = id,
                UpstreamEvent::MessageFieldDelta { field_name, delta } => {
                    let routed = route_field(&field_name, delta, state.config.reasoning_visible);
                    if !emit_routed(&mut out, &mut acc, routed, false).await {
                        return;
                    }
                }
                UpstreamEvent::MessageField { field_name, value } => {
                    let routed = route_field(&field_name, value, state.config.reasoning_visible);
                    if !emit_routed(&mut out, &mut acc, routed, true).await {
                        return;
                    }
                }
                UpstreamEvent::MessageResult { content } => {
                    cleanup.schedule(&cookie, &model, &acc.project_id);
                    if search && state.config.is_detail_answer_model(&model) {
                        if let Some(detail) = content.as_deref().and_then(unwrap_detail_answer) {
                            acc.content.push_str(&detail);
                            if !out.delta(Delta::content(detail)).await {
                                return;
                            }
                        }
                    }
                    let usage = Usage::from_estimates(
                        prompt_tokens,
                        tokens::estimate(&acc.content),
                        tokens::estimate(&acc.reasoning),
                    );
                    out.finish("stop", usage).await;
                    return;
                }
                _ => {}
            }
        }

        if fault.is_none() {
            // Stream drained without a terminal event: surface what we
            // have as a completed turn.
            let usage = Usage::from_estimates(
                prompt_tokens,
                tokens::estimate(&acc.content),
                tokens::estimate(&acc.reasoning),
            );
            out.finish("stop", usage).await;
            return;
        }

        match rotate_credential(&state, &mut body, &model) {
            Ok(next) => cookie = next,
            Err(e) => {
                out.fail(e).await;
                return;
            }
        }
    }

    out.fail(AppError::AllCredentialsUnavailable).await;
}

/// Emit a routed field update and fold it into the accumulator.
async fn emit_routed(
    out: &mut Emitter,
    acc: &mut TurnAccumulator,
    routed: Routed,
    whole_field: bool,
) -> bool {
    acc.apply(&routed, whole_field);
    match routed {
        Routed::Content(text) if !text.is_empty() => out.delta(Delta::content(text)).await,
        Routed::Reasoning(text) if !text.is_empty() => out.delta(Delta::reasoning(text)).await,
        _ => true,
    }
}

/// Producer for streaming chat with tools: content-routed text runs
/// through the incremental parser and surfaces as content or tool-call
/// argument deltas.
async fn run_stream_tool_chat(
    state: Arc<AppState>,
    mut cookie: String,
    model: String,
    mut body: serde_json::Value,
    mut out: Emitter,
) {
    let max_retries = state.pool.available_count().max(1);
    let cleanup = state.delete_only_cleanup_context();

    for _attempt in 0..max_retries {
        attach_antibot_token(&state, &cookie, &mut body).await;
        let prompt_tokens = tokens::estimate(&body.to_string());

        let mut lines = match dial_ask_stream(&state, &cookie, &body).await {
            Ok(lines) => lines,
            Err(e) => {
                out.fail(e).await;
                return;
            }
        };

        let mut parser = StreamParser::new();
        let mut call_id: Option<String> = None;
        let mut total_content = String::new();
        let mut total_reasoning = String::new();
        let mut project_id = String::new();
        let mut fault = None;

        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    out.fail(e).await;
                    return;
                }
            };
            let event = classify(&line);
            if let Some(f) = event.credential_fault() {
                apply_credential_fault(&state, &cookie, f);
                fault = Some(f);
                break;
            }
            if let Some(fatal) = event.fatal() {
                out.fail(fatal).await;
                return;
            }
            match event {
                UpstreamEvent::ProjectStart { id } => project_id = id,
                UpstreamEvent::MessageFieldDelta { field_name, delta }
                | UpstreamEvent::MessageField {
                    field_name,
                    value: delta,
                } => {
                    if is_tool_content_field(&field_name) {
                        total_content.push_str(&delta);
                        for parse_event in parser.process(&delta) {
                            if !emit_parse_event(&mut out, &mut call_id, parse_event).await {
                                return;
                            }
                        }
                    } else if field_name.starts_with("session_state.layer_")
                        || (state.config.reasoning_visible
                            && field_name == "session_state.answerthink")
                    {
                        total_reasoning.push_str(&delta);
                        if !out.delta(Delta::reasoning(delta)).await {
                            return;
                        }
                    }
                }
                UpstreamEvent::MessageResult { .. } => {
                    cleanup.schedule(&cookie, &model, &project_id);
                    break;
                }
                _ => {}
            }
        }

        if fault.is_none() {
            let finish_reason = if parser.saw_tool_call() {
                "tool_calls"
            } else {
                "stop"
            };
            let usage = Usage::from_estimates(
                prompt_tokens,
                tokens::estimate(&total_content),
                tokens::estimate(&total_reasoning),
            );
            out.finish(finish_reason, usage).await;
            return;
        }

        match rotate_credential(&state, &mut body, &model) {
            Ok(next) => cookie = next,
            Err(e) => {
                out.fail(e).await;
                return;
            }
        }
    }

    out.fail(AppError::AllCredentialsUnavailable).await;
}

/// Emit one parser event. The first tool-call fragment carries the call
/// id, type, and function name; later fragments carry argument slices only.
async fn emit_parse_event(
    out: &mut Emitter,
    call_id: &mut Option<String>,
    event: ParseEvent,
) -> bool {
    match event {
        ParseEvent::Content(text) => out.delta(Delta::content(text)).await,
        ParseEvent::ToolCallInc { text, tool } => {
            let first = call_id.is_none();
            let delta = ToolCallDelta {
                index: 0,
                id: if first {
                    let id = tooluse::new_call_id();
                    let out_id = id.clone();
                    *call_id = Some(id);
                    Some(out_id)
                } else {
                    None
                },
                call_type: first.then(|| "function".to_string()),
                function: Some(ToolCallFunctionDelta {
                    name: first.then_some(tool),
                    arguments: Some(text),
                }),
            };
            out.delta(Delta {
                role: Some("assistant".to_string()),
                tool_calls: Some(vec![delta]),
                ..Default::default()
            })
            .await
        }
    }
}

// ---------------------------------------------------------------------------
// Image-model chat
// ---------------------------------------------------------------------------

/// Serve a chat request that names an image model: run the generation
/// flow and answer with markdown image links.
async fn image_model_chat(state: Arc<AppState>, req: ChatCompletionRequest) -> AppResult<Response> {
    let prompt = req
        .last_user_text()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("user content is empty".into()))?;

    let generation = media::images::generate(
        &state,
        &ImagesRequest {
            model: req.model.clone(),
            prompt: prompt.clone(),
            response_format: None,
            image: None,
        },
    )
    .await?;

    let content = generation
        .data
        .iter()
        .filter_map(|d| d.url.as_deref())
        .map(|url| format!("![Image]({url})"))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt_tokens = tokens::estimate(&prompt);
    let usage = Usage::from_estimates(prompt_tokens, tokens::estimate(&content), 0);

    if req.stream {
        let id = response_id();
        let chunks = vec![
            format_sse_chunk(&StreamChunk::delta(&id, &req.model, Delta::content(content))),
            format_sse_chunk(&finish_chunk(&id, &req.model, "stop")),
            format_sse_chunk(&usage_chunk(&id, &req.model, usage)),
            format_sse_done(),
        ];
        let stream = futures::stream::iter(chunks.into_iter().map(Ok::<Bytes, AppError>));
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(stream))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {e}")))?;
        return Ok(response);
    }

    let response = ChatCompletionResponse::single(
        &req.model,
        ChoiceMessage::assistant(content),
        "stop",
        usage,
    );
    Ok(Json(response).into_response())
}
