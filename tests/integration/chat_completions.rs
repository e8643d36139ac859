//! Chat completion scenarios
//!
//! Streaming and non-streaming happy paths, credential rotation on
//! rate limits, reasoning routing, and authentication.

use axum::http::{header, StatusCode};
use serde_json::json;

use crate::common::{
    answer_delta, concat_content, field_delta, message_result, mock_ask, parse_sse_chunks,
    project_start, rate_limit_body, sse_body, TestHarness, COOKIE_A, COOKIE_B,
};

fn chat_body(model: &str, stream: bool) -> serde_json::Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "Hello there"}],
        "stream": stream,
    })
}

#[tokio::test]
async fn streaming_happy_path_emits_deltas_then_usage_then_done() {
    let harness = TestHarness::new().await;
    mock_ask(
        &harness.upstream,
        sse_body(&[
            project_start("P1"),
            answer_delta("Hel"),
            answer_delta("lo"),
            message_result(),
        ]),
    )
    .await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&chat_body("gpt-5.2", true))
        .await;

    response.assert_status_ok();
    let text = response.text();
    assert!(text.trim_end().ends_with("data: [DONE]"));

    let chunks = parse_sse_chunks(&text);
    // Two deltas, one finish chunk, one usage chunk.
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[0]["choices"][0]["delta"]["content"], "Hel");
    assert_eq!(chunks[1]["choices"][0]["delta"]["content"], "lo");
    assert_eq!(chunks[2]["choices"][0]["finish_reason"], "stop");
    assert!(chunks[2]["choices"][0]["delta"].get("content").is_none());
    assert!(chunks[3]["choices"].as_array().unwrap().is_empty());
    let usage = &chunks[3]["usage"];
    assert!(usage["prompt_tokens"].as_u64().unwrap() > 0);
    assert!(usage["completion_tokens"].as_u64().unwrap() > 0);
    assert!(usage["completion_tokens_details"]["reasoning_tokens"].is_number());

    assert_eq!(concat_content(&chunks), "Hello");
    for chunk in &chunks {
        assert_eq!(chunk["object"], "chat.completion.chunk");
    }
}

#[tokio::test]
async fn rate_limited_credential_rotates_and_cools_down() {
    let harness = TestHarness::new().await;

    // First dial hits the rate-limit signature regardless of which
    // credential the random pick draws; the retry loop must cool it down
    // and rotate to the other one.
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/api/copilot/ask"))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_body_string(rate_limit_body())
                .insert_header("content-type", "text/event-stream"),
        )
        .up_to_n_times(1)
        .mount(&harness.upstream)
        .await;
    let happy = sse_body(&[project_start("P2"), answer_delta("ok"), message_result()]);
    mock_ask(&harness.upstream, happy).await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&chat_body("gpt-5.2", false))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["choices"][0]["message"]["content"], "ok");

    // Exactly one dial per credential, and the first one is now cooling.
    let requests = harness.upstream.received_requests().await.unwrap();
    let cookies: Vec<String> = requests
        .iter()
        .filter(|r| r.url.path() == "/api/copilot/ask")
        .filter_map(|r| r.headers.get("Cookie"))
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(cookies.len(), 2);
    assert_ne!(cookies[0], cookies[1]);
    assert!(cookies.contains(&COOKIE_A.to_string()));
    assert!(cookies.contains(&COOKIE_B.to_string()));
    assert_eq!(harness.state.pool.available_count(), 1);
}

#[tokio::test]
async fn rate_limit_on_both_credentials_exhausts_the_pool() {
    let harness = TestHarness::new().await;
    mock_ask(&harness.upstream, rate_limit_body()).await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&chat_body("gpt-5.2", false))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json();
    assert_eq!(
        body["error"]["message"],
        "All cookies are temporarily unavailable."
    );
    // Both credentials ended up in cooldown.
    assert_eq!(harness.state.pool.available_count(), 0);
}

#[tokio::test]
async fn non_streaming_accumulates_content_and_reasoning() {
    let harness = TestHarness::new().await;
    mock_ask(
        &harness.upstream,
        sse_body(&[
            project_start("P3"),
            field_delta("session_state.answerthink", "let me think"),
            answer_delta("The answer "),
            answer_delta("is 42."),
            message_result(),
        ]),
    )
    .await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&chat_body("gpt-5.2", false))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["content"], "The answer is 42.");
    assert_eq!(
        body["choices"][0]["message"]["reasoning_content"],
        "let me think"
    );
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert!(body["usage"]["total_tokens"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn reasoning_streams_on_reasoning_content_channel() {
    let harness = TestHarness::new().await;
    mock_ask(
        &harness.upstream,
        sse_body(&[
            project_start("P4"),
            field_delta("session_state.layer_0", "thinking"),
            answer_delta("done"),
            message_result(),
        ]),
    )
    .await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&chat_body("claude-opus-4-6", true))
        .await;

    response.assert_status_ok();
    let chunks = parse_sse_chunks(&response.text());
    assert_eq!(chunks[0]["choices"][0]["delta"]["reasoning_content"], "thinking");
    assert!(chunks[0]["choices"][0]["delta"].get("content").is_none());
    assert_eq!(chunks[1]["choices"][0]["delta"]["content"], "done");
}

#[tokio::test]
async fn hidden_reasoning_is_dropped() {
    let harness = TestHarness::with_config(|config| config.reasoning_visible = false).await;
    mock_ask(
        &harness.upstream,
        sse_body(&[
            project_start("P5"),
            field_delta("session_state.answerthink", "secret"),
            answer_delta("public"),
            message_result(),
        ]),
    )
    .await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&chat_body("gpt-5.2", false))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["choices"][0]["message"]["content"], "public");
    assert!(body["choices"][0]["message"].get("reasoning_content").is_none());
}

#[tokio::test]
async fn cloudflare_challenge_is_fatal_not_a_rotation() {
    let harness = TestHarness::new().await;
    mock_ask(
        &harness.upstream,
        "<html><title>Just a moment...</title></html>".to_string(),
    )
    .await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&chat_body("gpt-5.2", false))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["message"], "Detected Cloudflare Challenge Page");
    // Neither credential was penalized.
    assert_eq!(harness.state.pool.available_count(), 2);
}

#[tokio::test]
async fn missing_secret_is_rejected() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .json(&chat_body("gpt-5.2", false))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, "Bearer wrong")
        .json(&chat_body("gpt-5.2", false))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn x_api_key_header_authenticates() {
    let harness = TestHarness::new().await;
    mock_ask(
        &harness.upstream,
        sse_body(&[project_start("P6"), answer_delta("hi"), message_result()]),
    )
    .await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(
            axum::http::HeaderName::from_static("x-api-key"),
            crate::common::TEST_SECRET,
        )
        .json(&chat_body("gpt-5.2", false))
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn empty_messages_is_a_bad_request() {
    let harness = TestHarness::new().await;
    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&json!({"model": "gpt-5.2", "messages": []}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn auto_bind_stores_the_session_for_reuse() {
    let harness = TestHarness::with_config(|config| {
        config.auto_bind = true;
        config.cookies = vec![COOKIE_A.to_string()];
    })
    .await;
    mock_ask(
        &harness.upstream,
        sse_body(&[project_start("P7"), answer_delta("bound"), message_result()]),
    )
    .await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&chat_body("gpt-5.2", false))
        .await;
    response.assert_status_ok();

    // The janitor task is detached; give it a beat.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(
        harness.state.sessions.get(COOKIE_A, "gpt-5.2").as_deref(),
        Some("P7")
    );
}

#[tokio::test]
async fn detail_answer_unwraps_for_search_models() {
    let harness = TestHarness::new().await;
    let envelope = json!({"detailAnswer": "unwrapped answer"}).to_string();
    mock_ask(
        &harness.upstream,
        sse_body(&[
            project_start("P8"),
            crate::common::message_result_with(&envelope),
        ]),
    )
    .await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&chat_body("o1-search", false))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["model"], "o1");
    assert_eq!(body["choices"][0]["message"]["content"], "unwrapped answer");
}
