//! Upstream protocol plumbing
//!
//! Everything that talks to, or interprets, the session-oriented SSE
//! upstream: the HTTP client, line re-assembly, event classification,
//! the anti-bot token fetch, and post-turn session cleanup.

pub mod antibot;
pub mod classify;
pub mod client;
pub mod janitor;
pub mod sse;

pub use antibot::AntibotClient;
pub use classify::{classify, CredentialFault, TaskStatus, UpstreamEvent};
pub use client::UpstreamClient;
pub use janitor::CleanupContext;
pub use sse::SseLineBuffer;
