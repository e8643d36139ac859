//! Session registry for upstream conversation reuse
//!
//! Maps (cookie, logical model) to the upstream project id so follow-up
//! requests continue the same conversation. Entries appear when a turn
//! ends under auto-bind and disappear only via `forget`. The configured
//! pinned model sessions layer above this registry at resolution time and
//! are owned by `Config`, not stored here.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Thread-safe (cookie, model) -> project id map
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project id bound to this credential and model, if any.
    pub fn get(&self, cookie: &str, model: &str) -> Option<String> {
        self.inner
            .read()
            .unwrap()
            .get(cookie)
            .and_then(|models| models.get(model))
            .cloned()
    }

    /// Bind a project id to (cookie, model), replacing any previous one.
    pub fn put(&self, cookie: &str, model: &str, project_id: &str) {
        self.inner
            .write()
            .unwrap()
            .entry(cookie.to_string())
            .or_default()
            .insert(model.to_string(), project_id.to_string());
    }

    /// Every project id bound under this credential.
    pub fn ids_for(&self, cookie: &str) -> HashSet<String> {
        self.inner
            .read()
            .unwrap()
            .get(cookie)
            .map(|models| models.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop the binding for (cookie, model).
    pub fn forget(&self, cookie: &str, model: &str) {
        let mut inner = self.inner.write().unwrap();
        if let Some(models) = inner.get_mut(cookie) {
            models.remove(model);
            if models.is_empty() {
                inner.remove(cookie);
            }
        }
    }
}
