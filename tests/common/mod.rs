//! Common test utilities
//!
//! A harness that runs the real router against a wiremock upstream, plus
//! builders for the upstream's SSE wire format.

#![allow(dead_code)]

use std::sync::Arc;

use axum_test::TestServer;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sparkgate::{build_router, AppState, Config};

pub const TEST_SECRET: &str = "test-secret";
pub const COOKIE_A: &str = "session_id=cookie-a";
pub const COOKIE_B: &str = "session_id=cookie-b";

/// Router + upstream mock + shared state for assertions
pub struct TestHarness {
    pub server: TestServer,
    pub upstream: MockServer,
    pub state: Arc<AppState>,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build a harness, letting the caller tweak the config first.
    pub async fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let upstream = MockServer::start().await;
        let mut config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            upstream_url: upstream.uri(),
            cookies: vec![COOKIE_A.to_string(), COOKIE_B.to_string()],
            proxy_url: None,
            antibot_url: None,
            api_secrets: vec![TEST_SECRET.to_string()],
            model_sessions: Default::default(),
            image_sessions: Default::default(),
            auto_delete: false,
            auto_bind: false,
            rate_limit_cooldown_secs: 600,
            reasoning_visible: true,
            pre_messages: None,
            detail_answer_models: vec!["o1".to_string()],
        };
        tweak(&mut config);

        let state = Arc::new(AppState::new(config).expect("state builds"));
        let server = TestServer::new(build_router(state.clone())).expect("server builds");
        Self {
            server,
            upstream,
            state,
        }
    }

    pub fn auth_header() -> String {
        format!("Bearer {TEST_SECRET}")
    }
}

/// Join events into the upstream's line-oriented SSE body.
pub fn sse_body(events: &[Value]) -> String {
    events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect()
}

pub fn project_start(id: &str) -> Value {
    json!({"type": "project_start", "id": id})
}

pub fn answer_delta(delta: &str) -> Value {
    field_delta("session_state.answer", delta)
}

pub fn field_delta(field_name: &str, delta: &str) -> Value {
    json!({"type": "message_field_delta", "field_name": field_name, "delta": delta})
}

pub fn message_result() -> Value {
    json!({"type": "message_result"})
}

pub fn message_result_with(content: &str) -> Value {
    json!({"type": "message_result", "content": content})
}

/// The upstream's rate-limit signature.
pub fn rate_limit_body() -> String {
    sse_body(&[json!({"type": "RATE_LIMIT", "message": "slow down"})])
}

/// Mount a catch-all mock for the ask endpoint.
pub async fn mock_ask(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/api/copilot/ask"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(server)
        .await;
}

/// Mount an ask mock that only matches one credential and demands exactly
/// `expected` dials.
pub async fn mock_ask_for_cookie(server: &MockServer, cookie: &str, body: String, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/api/copilot/ask"))
        .and(header("Cookie", cookie))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/event-stream"),
        )
        .expect(expected)
        .mount(server)
        .await;
}

/// Mount the task-status poll mock.
pub async fn mock_task_status(server: &MockServer, final_status: Value) {
    let body = sse_body(&[json!({
        "type": "TASKS_STATUS_COMPLETE",
        "final_status": final_status,
    })]);
    Mock::given(method("POST"))
        .and(path("/api/ig_tasks_status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(server)
        .await;
}

/// Pull the parsed data events out of a streamed response body.
pub fn parse_sse_chunks(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter(|payload| payload.trim() != "[DONE]")
        .map(|payload| serde_json::from_str(payload).expect("chunk is JSON"))
        .collect()
}

/// Concatenate the content deltas of a streamed response.
pub fn concat_content(chunks: &[Value]) -> String {
    chunks
        .iter()
        .filter_map(|chunk| chunk["choices"].get(0))
        .filter_map(|choice| choice["delta"]["content"].as_str())
        .collect()
}
