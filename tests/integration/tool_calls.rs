//! Tool-call synthesis scenarios
//!
//! The upstream streams plain text; the adapter turns replies in the
//! instructed JSON grammar (or the textual fallback) into OpenAI
//! tool-call shapes, non-streaming and incrementally.

use axum::http::{header, StatusCode};
use serde_json::{json, Value};

use crate::common::{
    answer_delta, message_result, mock_ask, parse_sse_chunks, project_start, sse_body, TestHarness,
};

fn tool_request(stream: bool) -> Value {
    json!({
        "model": "gpt-5.2",
        "messages": [{"role": "user", "content": "What's the weather in Paris?"}],
        "stream": stream,
        "tools": [{
            "type": "function",
            "function": {
                "name": "get_weather",
                "description": "Look up current weather",
                "parameters": {
                    "type": "object",
                    "properties": {"city": {"type": "string"}},
                },
            },
        }],
    })
}

/// Split `text` into `pieces` roughly equal char slices.
fn split_chars(text: &str, pieces: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = chars.len().div_ceil(pieces).max(1);
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Collect tool-call argument fragments across streamed chunks.
fn tool_fragments(chunks: &[Value]) -> Vec<&Value> {
    chunks
        .iter()
        .filter_map(|chunk| chunk["choices"].get(0))
        .filter_map(|choice| choice["delta"]["tool_calls"].get(0))
        .collect()
}

#[tokio::test]
async fn non_streaming_tool_call_is_parsed_and_validated() {
    let harness = TestHarness::new().await;
    let reply = json!({
        "type": "tool_call",
        "tool": "get_weather",
        "arguments": {"city": "Paris"},
    })
    .to_string();
    mock_ask(
        &harness.upstream,
        sse_body(&[project_start("T1"), answer_delta(&reply), message_result()]),
    )
    .await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&tool_request(false))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["choices"][0]["finish_reason"], "tool_calls");
    let call = &body["choices"][0]["message"]["tool_calls"][0];
    assert!(call["id"].as_str().unwrap().starts_with("call_"));
    assert_eq!(call["type"], "function");
    assert_eq!(call["function"]["name"], "get_weather");
    let args: Value = serde_json::from_str(call["function"]["arguments"].as_str().unwrap()).unwrap();
    assert_eq!(args, json!({"city": "Paris"}));
}

#[tokio::test]
async fn non_streaming_response_reply_becomes_content() {
    let harness = TestHarness::new().await;
    let reply = json!({"type": "response", "content": "It is sunny."}).to_string();
    mock_ask(
        &harness.upstream,
        sse_body(&[project_start("T2"), answer_delta(&reply), message_result()]),
    )
    .await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&tool_request(false))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["choices"][0]["message"]["content"], "It is sunny.");
    assert!(body["choices"][0]["message"].get("tool_calls").is_none());
}

#[tokio::test]
async fn non_streaming_unknown_tool_is_rejected() {
    let harness = TestHarness::new().await;
    let reply = json!({
        "type": "tool_call",
        "tool": "launch_rockets",
        "arguments": {},
    })
    .to_string();
    mock_ask(
        &harness.upstream,
        sse_body(&[project_start("T3"), answer_delta(&reply), message_result()]),
    )
    .await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&tool_request(false))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "invalid_tool_call");
}

#[tokio::test]
async fn non_streaming_format_violation_falls_back_to_text() {
    let harness = TestHarness::new().await;
    mock_ask(
        &harness.upstream,
        sse_body(&[
            project_start("T4"),
            answer_delta("I cannot answer in JSON, sorry."),
            message_result(),
        ]),
    )
    .await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&tool_request(false))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "I cannot answer in JSON, sorry."
    );
}

#[tokio::test]
async fn streaming_tool_call_emits_incremental_argument_deltas() {
    let harness = TestHarness::new().await;
    let reply = r#"{"type":"tool_call","tool":"get_weather","arguments":{"city":"Paris"}}"#;

    // The model's reply arrives sliced across twenty upstream deltas.
    let mut events = vec![project_start("T5")];
    events.extend(split_chars(reply, 20).iter().map(|s| answer_delta(s)));
    events.push(message_result());
    mock_ask(&harness.upstream, sse_body(&events)).await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&tool_request(true))
        .await;

    response.assert_status_ok();
    let chunks = parse_sse_chunks(&response.text());
    let fragments = tool_fragments(&chunks);
    assert!(!fragments.is_empty());

    // First fragment announces the call, later ones carry arguments only.
    let first = fragments[0];
    assert!(first["id"].as_str().unwrap().starts_with("call_"));
    assert_eq!(first["type"], "function");
    assert_eq!(first["function"]["name"], "get_weather");
    for fragment in &fragments[1..] {
        assert!(fragment.get("id").is_none());
        assert!(fragment["function"].get("name").is_none());
    }

    let arguments: String = fragments
        .iter()
        .filter_map(|f| f["function"]["arguments"].as_str())
        .collect();
    assert_eq!(arguments, r#"{"city":"Paris"}"#);

    let last = chunks
        .iter()
        .rfind(|c| !c["choices"].as_array().unwrap().is_empty())
        .unwrap();
    assert_eq!(last["choices"][0]["finish_reason"], "tool_calls");
}

#[tokio::test]
async fn streaming_text_sentinel_fallback_emits_one_tool_call() {
    let harness = TestHarness::new().await;
    let reply = "[Assistant called tools]:\n- read_file({\"path\":\"x.go\"})\n";
    let mut events = vec![project_start("T6")];
    events.extend(split_chars(reply, 7).iter().map(|s| answer_delta(s)));
    events.push(message_result());
    mock_ask(&harness.upstream, sse_body(&events)).await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&tool_request(true))
        .await;

    response.assert_status_ok();
    let chunks = parse_sse_chunks(&response.text());
    let fragments = tool_fragments(&chunks);
    assert!(!fragments.is_empty());
    assert_eq!(fragments[0]["function"]["name"], "read_file");

    let arguments: String = fragments
        .iter()
        .filter_map(|f| f["function"]["arguments"].as_str())
        .collect();
    assert_eq!(arguments, r#"{"path":"x.go"}"#);

    let last = chunks
        .iter()
        .rfind(|c| !c["choices"].as_array().unwrap().is_empty())
        .unwrap();
    assert_eq!(last["choices"][0]["finish_reason"], "tool_calls");
}

#[tokio::test]
async fn streaming_response_reply_streams_as_content() {
    let harness = TestHarness::new().await;
    let reply = r#"{"type":"response","content":"22C in Paris"}"#;
    let mut events = vec![project_start("T7")];
    events.extend(split_chars(reply, 9).iter().map(|s| answer_delta(s)));
    events.push(message_result());
    mock_ask(&harness.upstream, sse_body(&events)).await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&tool_request(true))
        .await;

    response.assert_status_ok();
    let chunks = parse_sse_chunks(&response.text());
    let content: String = chunks
        .iter()
        .filter_map(|chunk| chunk["choices"].get(0))
        .filter_map(|choice| choice["delta"]["content"].as_str())
        .collect();
    assert_eq!(content, "22C in Paris");

    let last = chunks
        .iter()
        .rfind(|c| !c["choices"].as_array().unwrap().is_empty())
        .unwrap();
    assert_eq!(last["choices"][0]["finish_reason"], "stop");
}
