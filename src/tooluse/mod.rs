//! Tool-call synthesis
//!
//! The upstream has no native tool calling. When a client submits tools,
//! the adapter prepends a strict system prompt demanding a single JSON
//! object reply, rewrites prior tool traffic into plain text the upstream
//! can replay, and parses the model's output back into OpenAI tool-call
//! shapes. Whole-reply parsing lives here; the character-level streaming
//! parser is in [`stream_parser`].

pub mod stream_parser;

use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::openai::{ChatCompletionRequest, ChatMessage, Content, Role, Tool, ToolCall, ToolCallFunction};

pub use stream_parser::{ParseEvent, StreamParser};

/// The reply grammar the system prompt demands
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ToolReply {
    #[serde(rename = "type")]
    pub reply_type: String,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub arguments: Option<serde_json::Value>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ToolReply {
    pub fn is_tool_call(&self) -> bool {
        self.reply_type == "tool_call"
    }
}

/// Fresh 8-char tool-call id
pub fn new_call_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("call_{}", &id[..8])
}

/// Build the system prompt describing the declared tools.
///
/// Returns `None` when no function tools are present.
pub fn system_prompt(tools: &[Tool]) -> Option<String> {
    let mut descriptions = Vec::new();
    for tool in tools {
        if tool.tool_type != "function" {
            continue;
        }
        let mut desc = format!("- {}", tool.function.name);
        if let Some(about) = &tool.function.description {
            if !about.is_empty() {
                desc.push_str(&format!(": {about}"));
            }
        }
        if let Some(params) = &tool.function.parameters {
            if let Ok(schema) = serde_json::to_string(params) {
                desc.push_str(&format!("\n  Parameters: {schema}"));
            }
        }
        descriptions.push(desc);
    }
    if descriptions.is_empty() {
        return None;
    }

    Some(format!(
        r#"You are a function-calling AI. You have access to external tools and MUST use them.

AVAILABLE TOOLS:
{}

STRICT RULES - FOLLOW EXACTLY:

1. You MUST call a tool when the user's request requires external data (weather, time, calculations, web search, etc.)

2. Your response MUST be ONLY this JSON format, nothing else:
{{"type":"tool_call","tool":"<TOOL_NAME>","arguments":{{<ARGS>}}}}

3. If you already have tool results (shown as [Tool Result for ...]), use them to answer:
{{"type":"response","content":"<your answer based on tool results>"}}

4. If no tool is needed and you can answer from your knowledge:
{{"type":"response","content":"<your answer>"}}

5. FORBIDDEN:
   - Do NOT explain why you can't get data
   - Do NOT say "I don't have access to..."
   - Do NOT write anything except the JSON
   - Do NOT use markdown or code blocks
   - Do NOT apologize

YOUR RESPONSE MUST START WITH {{ AND END WITH }} - NOTHING ELSE."#,
        descriptions.join("\n")
    ))
}

/// Rewrite prior tool traffic into plain chat history.
///
/// Assistant tool calls become a `[Assistant called tools]:` text block;
/// tool results become user messages tagged with the call id.
pub fn shim_history(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut shimmed = Vec::with_capacity(messages.len());
    for msg in messages {
        match (&msg.role, &msg.tool_calls) {
            (Role::Assistant, Some(calls)) if !calls.is_empty() => {
                let mut text = String::from("[Assistant called tools]:\n");
                for call in calls {
                    text.push_str(&format!(
                        "- {}({})\n",
                        call.function.name, call.function.arguments
                    ));
                }
                if let Some(content) = &msg.content {
                    let plain = content.as_text();
                    if !plain.is_empty() {
                        text.push_str("\nAssistant message: ");
                        text.push_str(&plain);
                    }
                }
                shimmed.push(ChatMessage::text(Role::Assistant, text));
            }
            (Role::Tool, _) => {
                let call_id = msg.tool_call_id.clone().unwrap_or_default();
                let content = msg
                    .content
                    .as_ref()
                    .map(|c| c.as_text())
                    .unwrap_or_default();
                shimmed.push(ChatMessage::text(
                    Role::User,
                    format!("[Tool Result for {call_id}]: {content}"),
                ));
            }
            _ => shimmed.push(msg),
        }
    }
    shimmed
}

/// Prepare a request for the tool-use flow: shim history and inject the
/// system prompt, merging into an existing system message when present.
pub fn prepare_request(req: &mut ChatCompletionRequest) {
    let Some(prompt) = system_prompt(&req.tools) else {
        return;
    };
    let messages = std::mem::take(&mut req.messages);
    let mut messages = shim_history(messages);

    match messages.iter().position(|m| m.role == Role::System) {
        Some(i) => {
            let current = messages[i]
                .content
                .as_ref()
                .map(|c| c.as_text())
                .unwrap_or_default();
            messages[i].content = Some(Content::Text(format!("{current}\n\n{prompt}")));
        }
        None => messages.insert(0, ChatMessage::text(Role::System, prompt)),
    }
    req.messages = messages;
}

/// Parse the model's whole reply.
///
/// Locates the outermost JSON object in the text; an error here means the
/// model ignored the format and the caller should fall back to a plain
/// content response.
pub fn parse_reply(text: &str) -> AppResult<ToolReply> {
    let text = text.trim();
    let start = text
        .find('{')
        .ok_or_else(|| AppError::BadRequest("no JSON object in reply".into()))?;
    let end = text
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| AppError::BadRequest("no JSON object in reply".into()))?;

    let reply: ToolReply = serde_json::from_str(&text[start..=end])
        .map_err(|e| AppError::BadRequest(format!("reply is not valid JSON: {e}")))?;

    if reply.reply_type != "tool_call" && reply.reply_type != "response" {
        return Err(AppError::BadRequest(format!(
            "unexpected reply type: {}",
            reply.reply_type
        )));
    }
    if reply.is_tool_call() && reply.tool.as_deref().unwrap_or("").is_empty() {
        return Err(AppError::BadRequest("tool_call missing tool name".into()));
    }
    Ok(reply)
}

/// Reject tool calls naming tools the client never declared.
pub fn validate_reply(reply: &ToolReply, tools: &[Tool]) -> AppResult<()> {
    if !reply.is_tool_call() {
        return Ok(());
    }
    let name = reply.tool.as_deref().unwrap_or("");
    let known = tools
        .iter()
        .any(|t| t.tool_type == "function" && t.function.name == name);
    if known {
        Ok(())
    } else {
        Err(AppError::InvalidToolCall(format!("unknown tool: {name}")))
    }
}

/// Convert a parsed tool call into the OpenAI wire shape.
pub fn to_tool_call(reply: &ToolReply) -> AppResult<ToolCall> {
    if !reply.is_tool_call() {
        return Err(AppError::Internal(anyhow::anyhow!(
            "reply is not a tool call"
        )));
    }
    let arguments = reply.arguments.clone().unwrap_or_else(|| json!({}));
    Ok(ToolCall {
        id: new_call_id(),
        call_type: "function".to_string(),
        function: ToolCallFunction {
            name: reply.tool.clone().unwrap_or_default(),
            arguments: serde_json::to_string(&arguments)?,
        },
    })
}
