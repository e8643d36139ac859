//! Upstream event classification
//!
//! A pure, total function from a raw SSE data line (or a whole HTTP body)
//! to one event. Failure signatures are substring matches checked before
//! any JSON parsing, because Cloudflare and maintenance pages are not
//! JSON at all; normal events dispatch on their `type` field. The
//! classifier performs no I/O and never fails: anything unrecognized is
//! `Unknown` and ignored by callers.

use std::collections::HashMap;

use serde::Deserialize;

// Failure signatures observed on the upstream wire.
const CF_CHALLENGE_MARKERS: &[&str] = &["Just a moment", "cf-chl"];
const CF_BLOCK_MARKER: &str = "Sorry, you have been blocked";
const SERVICE_UNAVAILABLE_MARKER: &str = "Service Unavailable";
const OVERLOADED_MARKER: &str = "server is overloaded";
const RATE_LIMIT_MARKER: &str = "\"type\":\"RATE_LIMIT\"";
const FREE_QUOTA_MARKER: &str = "\"type\":\"FREE_CREDITS_OVER\"";
const NOT_LOGIN_MARKER: &str = "\"type\":\"NOT_LOGIN\"";
const SERVER_ERROR_MARKER: &str = "\"status\":500";

/// Per-task terminal status in an image/video poll
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct TaskStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub video_urls: Vec<String>,
}

/// One classified upstream event
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    ProjectStart { id: String },
    MessageFieldDelta { field_name: String, delta: String },
    MessageField { field_name: String, value: String },
    MessageResult { content: Option<String> },
    TasksStatusComplete { final_status: HashMap<String, TaskStatus> },
    RateLimited,
    FreeQuotaExhausted,
    NotLoggedIn,
    CloudflareChallenge,
    CloudflareBlock,
    ServiceUnavailable,
    ServerError,
    ServerOverloaded,
    Unknown,
}

/// Credential-scoped fault kinds, driving the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFault {
    RateLimited,
    FreeQuotaExhausted,
    NotLoggedIn,
}

impl UpstreamEvent {
    /// The credential fault this event represents, if any.
    pub fn credential_fault(&self) -> Option<CredentialFault> {
        match self {
            UpstreamEvent::RateLimited => Some(CredentialFault::RateLimited),
            UpstreamEvent::FreeQuotaExhausted => Some(CredentialFault::FreeQuotaExhausted),
            UpstreamEvent::NotLoggedIn => Some(CredentialFault::NotLoggedIn),
            _ => None,
        }
    }

    /// The fatal, non-credential error this event maps to, if any.
    pub fn fatal(&self) -> Option<crate::error::AppError> {
        use crate::error::AppError;
        match self {
            UpstreamEvent::CloudflareChallenge => Some(AppError::CloudflareChallenge),
            UpstreamEvent::CloudflareBlock => Some(AppError::CloudflareBlock),
            UpstreamEvent::ServiceUnavailable => Some(AppError::ServiceUnavailable),
            UpstreamEvent::ServerError => Some(AppError::ServerError),
            UpstreamEvent::ServerOverloaded => Some(AppError::ServerOverloaded),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: Option<String>,
    id: Option<String>,
    field_name: Option<String>,
    delta: Option<String>,
    field_value: Option<serde_json::Value>,
    content: Option<String>,
    final_status: Option<HashMap<String, TaskStatus>>,
}

/// Classify one raw line or body.
pub fn classify(input: &str) -> UpstreamEvent {
    let input = input.trim();

    if CF_CHALLENGE_MARKERS.iter().any(|m| input.contains(m)) {
        return UpstreamEvent::CloudflareChallenge;
    }
    if input.contains(CF_BLOCK_MARKER) {
        return UpstreamEvent::CloudflareBlock;
    }
    if input.contains(SERVICE_UNAVAILABLE_MARKER) && input.contains("<html") {
        return UpstreamEvent::ServiceUnavailable;
    }
    if input.contains(OVERLOADED_MARKER) {
        return UpstreamEvent::ServerOverloaded;
    }
    if input.contains(RATE_LIMIT_MARKER) {
        return UpstreamEvent::RateLimited;
    }
    if input.contains(FREE_QUOTA_MARKER) {
        return UpstreamEvent::FreeQuotaExhausted;
    }
    if input.contains(NOT_LOGIN_MARKER) {
        return UpstreamEvent::NotLoggedIn;
    }
    if input.contains(SERVER_ERROR_MARKER) {
        return UpstreamEvent::ServerError;
    }

    let payload = input.strip_prefix("data:").map(str::trim_start).unwrap_or(input);
    if !payload.starts_with('{') {
        return UpstreamEvent::Unknown;
    }
    let Ok(raw) = serde_json::from_str::<RawEvent>(payload) else {
        return UpstreamEvent::Unknown;
    };

    match raw.event_type.as_deref() {
        Some("project_start") => UpstreamEvent::ProjectStart {
            id: raw.id.unwrap_or_default(),
        },
        Some("message_field_delta") => UpstreamEvent::MessageFieldDelta {
            field_name: raw.field_name.unwrap_or_default(),
            // Some models send whole-value updates down the delta channel.
            delta: match raw.delta {
                Some(d) if !d.is_empty() => d,
                _ => match raw.field_value {
                    Some(serde_json::Value::String(s)) => s,
                    _ => String::new(),
                },
            },
        },
        Some("message_field") => UpstreamEvent::MessageField {
            field_name: raw.field_name.unwrap_or_default(),
            value: match raw.field_value {
                Some(serde_json::Value::String(s)) => s,
                _ => String::new(),
            },
        },
        Some("message_result") => UpstreamEvent::MessageResult {
            content: raw.content,
        },
        Some("TASKS_STATUS_COMPLETE") => UpstreamEvent::TasksStatusComplete {
            final_status: raw.final_status.unwrap_or_default(),
        },
        _ => UpstreamEvent::Unknown,
    }
}
