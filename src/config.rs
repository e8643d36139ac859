//! Configuration management for sparkgate
//!
//! Configuration is loaded from environment variables once at startup.
//! Nothing in here is hot-path state; the credential pool and session
//! registry own their own mutable views.

use std::collections::HashMap;
use std::env;

use anyhow::{bail, Context, Result};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Upstream base URL
    pub upstream_url: String,
    /// Credential cookies, in configured order
    pub cookies: Vec<String>,
    /// Outbound HTTP proxy for upstream calls
    pub proxy_url: Option<String>,
    /// Anti-bot helper base URL; None disables the token fetch
    pub antibot_url: Option<String>,

    /// Client API secret allowlist; empty list leaves the surface open
    pub api_secrets: Vec<String>,

    /// Pinned model -> project id sessions (never auto-deleted)
    pub model_sessions: HashMap<String, String>,
    /// Pinned cookie -> project id sessions for the image engine
    pub image_sessions: HashMap<String, String>,

    /// Delete finished upstream sessions
    pub auto_delete: bool,
    /// Bind finished sessions to (cookie, model) for reuse
    pub auto_bind: bool,

    /// Cooldown applied on a rate-limit signal, in seconds
    pub rate_limit_cooldown_secs: u64,
    /// Surface chain-of-thought as reasoning_content
    pub reasoning_visible: bool,

    /// Messages spliced in after the last system message, as raw JSON
    pub pre_messages: Option<String>,
    /// Models whose `-search` turns end with a detailAnswer envelope
    pub detail_answer_models: Vec<String>,
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn env_json_map(key: &str) -> Result<HashMap<String, String>> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {key}"))
        }
        _ => Ok(HashMap::new()),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let cookies: Vec<String> = env::var("SG_COOKIES")
            .unwrap_or_default()
            .split('|')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if cookies.is_empty() {
            bail!("SG_COOKIES must contain at least one cookie");
        }

        let api_secrets = env::var("SG_API_SECRETS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let detail_answer_models = env::var("SG_DETAIL_ANSWER_MODELS")
            .unwrap_or_else(|_| "o1".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: env::var("SG_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SG_PORT")
                .unwrap_or_else(|_| "7055".to_string())
                .parse()
                .context("Invalid SG_PORT")?,

            upstream_url: env::var("SG_UPSTREAM_URL")
                .unwrap_or_else(|_| "https://www.genspark.ai".to_string()),
            cookies,
            proxy_url: env::var("SG_PROXY_URL").ok().filter(|v| !v.is_empty()),
            antibot_url: env::var("SG_ANTIBOT_URL")
                .ok()
                .filter(|v| v.starts_with("http://") || v.starts_with("https://")),

            api_secrets,

            model_sessions: env_json_map("SG_MODEL_SESSIONS")?,
            image_sessions: env_json_map("SG_IMAGE_SESSIONS")?,

            auto_delete: env_bool("SG_AUTO_DELETE", false),
            auto_bind: env_bool("SG_AUTO_BIND", false),

            rate_limit_cooldown_secs: env::var("SG_RATE_LIMIT_COOLDOWN_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .context("Invalid SG_RATE_LIMIT_COOLDOWN_SECS")?,
            reasoning_visible: env_bool("SG_REASONING_VISIBLE", true),

            pre_messages: env::var("SG_PRE_MESSAGES").ok().filter(|v| !v.trim().is_empty()),
            detail_answer_models,
        })
    }

    /// True when the turn should unwrap a detailAnswer envelope
    pub fn is_detail_answer_model(&self, model: &str) -> bool {
        self.detail_answer_models.iter().any(|m| m == model)
    }
}
