//! Upstream field routing
//!
//! The upstream streams named field updates against its session state;
//! only a handful of those fields carry text the client should see.
//! Answer fields become `content`, per-layer thoughts and chain-of-thought
//! become `reasoning_content`, framing markers are dropped. Routing is
//! case-sensitive and ordered per-field: deltas append, whole-field
//! updates replace.

use serde::Deserialize;

/// Where one field update lands in the client-facing delta
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Content(String),
    Reasoning(String),
    Ignored,
}

/// Route a field update to its output channel.
pub fn route_field(field_name: &str, text: String, reasoning_visible: bool) -> Routed {
    if field_name == "session_state.answer"
        || field_name.contains("session_state.streaming_detail_answer")
        || field_name == "session_state.streaming_markmap"
    {
        return Routed::Content(text);
    }
    if field_name.starts_with("session_state.layer_") {
        return Routed::Reasoning(text);
    }
    if field_name == "session_state.answerthink" {
        return if reasoning_visible {
            Routed::Reasoning(text)
        } else {
            Routed::Ignored
        };
    }
    // answerthink_is_started / answerthink_is_finished and everything else
    Routed::Ignored
}

/// Per-turn output accumulator
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    pub content: String,
    pub reasoning: String,
    pub project_id: String,
}

impl TurnAccumulator {
    /// Fold one routed update in. Whole-field updates replace the channel
    /// rather than appending to it.
    pub fn apply(&mut self, routed: &Routed, whole_field: bool) {
        match routed {
            Routed::Content(text) => {
                if whole_field {
                    self.content = text.clone();
                } else {
                    self.content.push_str(text);
                }
            }
            Routed::Reasoning(text) => {
                if whole_field {
                    self.reasoning = text.clone();
                } else {
                    self.reasoning.push_str(text);
                }
            }
            Routed::Ignored => {}
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetailEnvelope {
    #[serde(rename = "detailAnswer")]
    detail_answer: String,
}

/// Unwrap the `detailAnswer` envelope some search turns end with.
pub fn unwrap_detail_answer(content: &str) -> Option<String> {
    serde_json::from_str::<DetailEnvelope>(content)
        .ok()
        .map(|e| e.detail_answer)
}
