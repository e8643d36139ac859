//! Request types for the OpenAI-compatible surface
//!
//! Message content is polymorphic: either a plain string or a list of
//! typed parts. The `private_file` part is what attachments become after
//! the preprocessor uploads non-image bytes to upstream storage.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Role of a message participant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Image URL reference for multimodal content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

/// Upstream private-storage attachment descriptor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrivateFile {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: usize,
    pub ext: String,
    pub private_storage_url: String,
}

/// A part of multimodal content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    PrivateFile { private_file: PrivateFile },
}

/// Message content - either plain text or multimodal parts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Concatenated text of either variant
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Per-message hint the upstream reads when replaying history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionState {
    pub models: Vec<String>,
}

/// A tool (function) declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// A completed tool call as it appears in assistant history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

/// A chat message with role and content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_prompt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_state: Option<SessionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(Content::Text(text.into())),
            is_prompt: None,
            session_state: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
}

impl ChatCompletionRequest {
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    /// Text of the most recent user message, if any
    pub fn last_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.content.as_ref())
            .map(|c| c.as_text())
    }

    /// Keep system messages plus everything from the last user message on.
    ///
    /// Applied when no upstream session exists for the turn, since the
    /// upstream would otherwise see the history twice.
    pub fn filter_to_last_user(&mut self) {
        let last_user = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::User);
        let Some(last_user) = last_user else { return };
        let mut filtered = Vec::with_capacity(self.messages.len());
        for (i, msg) in self.messages.drain(..).enumerate() {
            if msg.role == Role::System || i >= last_user {
                filtered.push(msg);
            }
        }
        self.messages = filtered;
    }

    /// Splice configured messages in after the last system message.
    pub fn splice_pre_messages(&mut self, raw_json: &str) -> AppResult<()> {
        let extra: Vec<ChatMessage> = serde_json::from_str(raw_json)
            .map_err(|e| AppError::BadRequest(format!("Invalid pre-message JSON: {e}")))?;
        let insert_at = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::System)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.messages.splice(insert_at..insert_at, extra);
        Ok(())
    }

    /// Model-specific history rewriting.
    ///
    /// `deep-seek-r1` rejects system roles and expects replayed assistant
    /// turns to carry a models hint.
    pub fn rewrite_for_model(&mut self, model: &str) {
        if model != "deep-seek-r1" {
            return;
        }
        for msg in &mut self.messages {
            match msg.role {
                Role::System => msg.role = Role::User,
                Role::Assistant => {
                    msg.is_prompt = Some(false);
                    msg.session_state = Some(SessionState {
                        models: vec![model.to_string()],
                    });
                }
                _ => {}
            }
        }
    }
}

/// Image generation request
#[derive(Debug, Clone, Deserialize)]
pub struct ImagesRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub response_format: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl ImagesRequest {
    pub fn wants_base64(&self) -> bool {
        self.response_format.as_deref() == Some("b64_json")
    }
}

/// Video generation request
#[derive(Debug, Clone, Deserialize)]
pub struct VideosRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub auto_prompt: bool,
    #[serde(default)]
    pub image: Option<String>,
}
