//! Chat execution
//!
//! The engine drives a whole turn: request shaping, credential selection,
//! the upstream SSE read loop with rotation on credential faults, and the
//! translation of upstream events into OpenAI-shaped output.

pub mod engine;
pub mod preprocess;
pub mod translate;
