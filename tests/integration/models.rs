//! Model listing scenarios

use axum::http::{header, StatusCode};
use serde_json::Value;

use crate::common::TestHarness;

#[tokio::test]
async fn models_lists_the_catalog() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .get("/v1/models")
        .add_header(header::AUTHORIZATION, TestHarness::auth_header())
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["object"], "list");
    let data = body["data"].as_array().unwrap();
    assert!(!data.is_empty());
    for entry in data {
        assert_eq!(entry["object"], "model");
        assert!(entry["id"].as_str().is_some());
    }
    let ids: Vec<&str> = data.iter().filter_map(|e| e["id"].as_str()).collect();
    assert!(ids.contains(&"gpt-5.2"));
    assert!(ids.contains(&"nano-banana-pro"));
    assert!(ids.contains(&"sora-2"));
}

#[tokio::test]
async fn models_requires_authentication() {
    let harness = TestHarness::new().await;
    let response = harness.server.get("/v1/models").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}
