//! Image and video generation
//!
//! Both flows are two-phase: submit the job on the ask endpoint, harvest
//! the project id and task ids from the response, then poll the task
//! status endpoint until the terminal status event arrives.

pub mod images;
pub mod videos;

use std::collections::HashMap;

use serde::Deserialize;

use crate::upstream::{classify, TaskStatus, UpstreamEvent};

#[derive(Debug, Deserialize)]
struct SubmissionContent {
    content: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedImages {
    #[serde(default)]
    generated_images: Vec<GeneratedTask>,
}

#[derive(Debug, Deserialize)]
struct GeneratedTask {
    #[serde(default)]
    task_id: String,
}

/// Harvest the project id and task ids from a submission response body.
///
/// The task ids hide one level deep: an event whose `content` field is
/// itself a JSON document carrying `generated_images`.
pub(crate) fn extract_submission(body: &str) -> (String, Vec<String>) {
    let mut project_id = String::new();
    let mut task_ids = Vec::new();

    for line in body.lines() {
        if let UpstreamEvent::ProjectStart { id } = classify(line) {
            project_id = id;
            continue;
        }
        if !line.contains("task_id") {
            continue;
        }
        let payload = line.trim().trim_start_matches("data:").trim_start();
        let Ok(outer) = serde_json::from_str::<SubmissionContent>(payload) else {
            continue;
        };
        let Ok(inner) = serde_json::from_str::<GeneratedImages>(&outer.content) else {
            continue;
        };
        for task in inner.generated_images {
            if !task.task_id.is_empty() {
                task_ids.push(task.task_id);
            }
        }
    }

    (project_id, task_ids)
}

/// Pull the SUCCESS URLs out of a terminal status map, in task-id order.
pub(crate) fn collect_success_urls(
    final_status: &HashMap<String, TaskStatus>,
    task_ids: &[String],
    prefer_video: bool,
) -> Vec<String> {
    let mut urls = Vec::new();
    for task_id in task_ids {
        let Some(task) = final_status.get(task_id) else {
            continue;
        };
        if task.status != "SUCCESS" {
            continue;
        }
        let url = if prefer_video {
            task.video_urls.first().or_else(|| task.image_urls.first())
        } else {
            task.image_urls.first()
        };
        if let Some(url) = url {
            urls.push(url.clone());
        }
    }
    urls
}
