//! Image and video generation scenarios

use axum::http::header;
use serde_json::{json, Value};

use crate::common::{mock_task_status, project_start, sse_body, TestHarness};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mount the ask mock for a generation submission carrying task ids.
async fn mock_submission(server: &MockServer, project_id: &str, task_ids: &[&str]) {
    let inner = json!({
        "generated_images": task_ids
            .iter()
            .map(|id| json!({"task_id": id}))
            .collect::<Vec<_>>(),
    })
    .to_string();
    let body = sse_body(&[project_start(project_id), json!({"content": inner})]);
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

#[tokio::test]
async fn image_generation_returns_urls_in_task_order() {
    let harness = TestHarness::new().await;
    mock_submission(&harness.upstream, "IMG1", &["T1", "T2"]).await;
    mock_task_status(
        &harness.upstream,
        json!({
            "T1": {"status": "SUCCESS", "image_urls": ["u1"]},
            "T2": {"status": "SUCCESS", "image_urls": ["u2"]},
        }),
    )
    .await;

    let response = harness
        .server
        .post("/v1/images/generations")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&json!({"model": "nano-banana-pro", "prompt": "a banana"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["created"].as_u64().unwrap() > 0);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["url"], "u1");
    assert_eq!(data[1]["url"], "u2");
    assert_eq!(data[0]["revised_prompt"], "a banana");
}

#[tokio::test]
async fn failed_tasks_are_excluded_from_the_result() {
    let harness = TestHarness::new().await;
    mock_submission(&harness.upstream, "IMG2", &["T1", "T2"]).await;
    mock_task_status(
        &harness.upstream,
        json!({
            "T1": {"status": "FAILED", "image_urls": []},
            "T2": {"status": "SUCCESS", "image_urls": ["u2"]},
        }),
    )
    .await;

    let response = harness
        .server
        .post("/v1/images/generations")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&json!({"model": "nano-banana-pro", "prompt": "a banana"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["url"], "u2");
}

#[tokio::test]
async fn empty_prompt_is_rejected() {
    let harness = TestHarness::new().await;
    let response = harness
        .server
        .post("/v1/images/generations")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&json!({"model": "nano-banana-pro", "prompt": "  "}))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn video_generation_prefers_video_urls() {
    let harness = TestHarness::new().await;
    mock_submission(&harness.upstream, "VID1", &["V1"]).await;
    mock_task_status(
        &harness.upstream,
        json!({
            "V1": {
                "status": "SUCCESS",
                "image_urls": ["thumb.png"],
                "video_urls": ["clip.mp4"],
            },
        }),
    )
    .await;

    let response = harness
        .server
        .post("/v1/videos/generations")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&json!({
            "model": "sora-2",
            "prompt": "a rolling wave",
            "aspect_ratio": "16:9",
            "duration": 8,
            "auto_prompt": true,
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["url"], "clip.mp4");
    assert_eq!(data[0]["revised_prompt"], "a rolling wave");
}

#[tokio::test]
async fn chat_request_for_an_image_model_answers_with_markdown() {
    let harness = TestHarness::new().await;
    mock_submission(&harness.upstream, "IMG3", &["T1"]).await;
    mock_task_status(
        &harness.upstream,
        json!({"T1": {"status": "SUCCESS", "image_urls": ["https://img/u1.webp"]}}),
    )
    .await;

    let response = harness
        .server
        .post("/v1/chat/completions")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .json(&json!({
            "model": "nano-banana-pro",
            "messages": [{"role": "user", "content": "a banana"}],
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "![Image](https://img/u1.webp)"
    );
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}
