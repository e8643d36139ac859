//! OpenAI-compatible wire types
//!
//! Request and response shapes for the client-facing surface. The
//! upstream speaks its own session protocol; these types never leave the
//! adapter boundary unchanged.

pub mod request;
pub mod response;

pub use request::{
    ChatCompletionRequest, ChatMessage, Content, ContentPart, ImagesRequest, PrivateFile, Role,
    SessionState, Tool, ToolCall, ToolCallFunction, VideosRequest,
};
pub use response::{
    finish_chunk, format_sse_chunk, format_sse_done, now_unix, response_id, usage_chunk,
    ChatCompletionResponse, Choice, ChoiceMessage, CompletionTokensDetails, Delta, GenerationData,
    GenerationResponse, ModelEntry, ModelListResponse, StreamChoice, StreamChunk, ToolCallDelta,
    ToolCallFunctionDelta, Usage,
};
