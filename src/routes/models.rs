//! Model listing endpoint

use axum::Json;

use crate::catalog;
use crate::openai::{ModelEntry, ModelListResponse};

/// Handle `GET /v1/models`.
pub async fn list_models() -> Json<ModelListResponse> {
    let data = catalog::all_models()
        .map(|id| ModelEntry {
            id: id.to_string(),
            object: "model".to_string(),
        })
        .collect();
    Json(ModelListResponse {
        object: "list".to_string(),
        data,
    })
}
