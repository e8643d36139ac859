//! Post-turn session cleanup
//!
//! Every terminal event that produced a project id schedules one of two
//! outcomes: bind the session for reuse, or delete it upstream. The task
//! is detached from the request so a client hang-up after the terminal
//! event never cancels the cleanup.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::pool::SessionRegistry;

use super::client::UpstreamClient;

/// Everything the detached cleanup task needs, snapshotted per turn
#[derive(Clone)]
pub struct CleanupContext {
    pub upstream: Arc<UpstreamClient>,
    pub sessions: Arc<SessionRegistry>,
    /// Project ids pinned by configuration, never deleted
    pub pinned: Arc<HashSet<String>>,
    pub auto_bind: bool,
    pub auto_delete: bool,
}

impl CleanupContext {
    /// Schedule cleanup for a finished turn. Fire-and-forget.
    pub fn schedule(&self, cookie: &str, model: &str, project_id: &str) {
        if project_id.is_empty() {
            return;
        }
        let ctx = self.clone();
        let cookie = cookie.to_string();
        let model = model.to_string();
        let project_id = project_id.to_string();

        tokio::spawn(async move {
            if ctx.auto_bind {
                debug!(%project_id, %model, "binding session for reuse");
                ctx.sessions.put(&cookie, &model, &project_id);
                return;
            }
            if !ctx.auto_delete {
                debug!(%project_id, "auto-delete disabled, keeping session");
                return;
            }
            if ctx.pinned.contains(&project_id) {
                debug!(%project_id, "session pinned by configuration, keeping");
                return;
            }
            if ctx.sessions.ids_for(&cookie).contains(&project_id) {
                debug!(%project_id, "session bound in registry, keeping");
                return;
            }
            if let Err(e) = ctx.upstream.delete_project(&cookie, &project_id).await {
                warn!(%project_id, error = %e, "session delete failed");
            }
        });
    }
}
