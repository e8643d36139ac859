mod chat_completions;
mod generations;
mod models;
mod tool_calls;
