//! sparkgate - OpenAI-compatible gateway over the Genspark copilot API
//!
//! Clients speak the OpenAI REST dialect; the gateway translates each
//! call into the upstream's session-oriented SSE protocol, rotating
//! through a pool of cookie credentials and synthesizing the pieces the
//! upstream lacks (tool calls, image/video job polling).

pub mod catalog;
pub mod chat;
pub mod config;
pub mod error;
pub mod media;
pub mod middleware;
pub mod openai;
pub mod pool;
pub mod routes;
pub mod tokens;
pub mod tooluse;
pub mod upstream;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use axum::{middleware as axum_middleware, routing::get, routing::post, Router};
use tower_http::trace::TraceLayer;

pub use crate::config::Config;
pub use crate::error::{AppError, AppResult};

use crate::pool::{CredentialPool, SessionRegistry};
use crate::upstream::{AntibotClient, CleanupContext, UpstreamClient};

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    pub pool: CredentialPool,
    pub sessions: Arc<SessionRegistry>,
    pub upstream: Arc<UpstreamClient>,
    pub antibot: AntibotClient,
    /// Project ids pinned by configuration, never auto-deleted
    pinned: Arc<HashSet<String>>,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config) -> Result<Self> {
        let upstream = Arc::new(UpstreamClient::new(
            &config.upstream_url,
            config.proxy_url.as_deref(),
        )?);
        let antibot = AntibotClient::new(config.antibot_url.as_deref());
        let pool = CredentialPool::new(config.cookies.iter().cloned());

        let pinned: HashSet<String> = config
            .model_sessions
            .values()
            .chain(config.image_sessions.values())
            .cloned()
            .collect();

        Ok(Self {
            config,
            pool,
            sessions: Arc::new(SessionRegistry::new()),
            upstream,
            antibot,
            pinned: Arc::new(pinned),
        })
    }

    /// Snapshot of everything the detached session janitor needs.
    pub fn cleanup_context(&self) -> CleanupContext {
        CleanupContext {
            upstream: self.upstream.clone(),
            sessions: self.sessions.clone(),
            pinned: self.pinned.clone(),
            auto_bind: self.config.auto_bind,
            auto_delete: self.config.auto_delete,
        }
    }

    /// Cleanup context for generation flows, which never bind sessions.
    pub fn delete_only_cleanup_context(&self) -> CleanupContext {
        CleanupContext {
            auto_bind: false,
            ..self.cleanup_context()
        }
    }
}

/// Build the client-facing router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route("/chat/completions", post(routes::chat::chat_completions))
        .route("/images/generations", post(routes::images::images_generations))
        .route("/videos/generations", post(routes::videos::videos_generations))
        .route("/models", get(routes::models::list_models))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_api_secret,
        ));

    Router::new()
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
