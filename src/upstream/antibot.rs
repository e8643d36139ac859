//! Anti-bot token fetch
//!
//! An optional helper service mints short-lived tokens that satisfy the
//! upstream's client-side fraud checks. The fetch is strictly
//! best-effort: any network, status, or format failure yields `None` and
//! the request proceeds without a token. If the upstream then rejects the
//! call, the classifier handles it like any other credential signal.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    token: String,
    #[serde(default)]
    message: String,
}

/// Client for the anti-bot helper service
pub struct AntibotClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl AntibotClient {
    /// `base_url: None` disables the fetch entirely.
    pub fn new(base_url: Option<&str>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.map(|b| b.trim_end_matches('/').to_string()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    /// Fetch a token for the given credential, or `None` on any failure.
    pub async fn fetch_token(&self, cookie: &str) -> Option<String> {
        let base = self.base_url.as_ref()?;
        let url = format!("{base}/genspark");

        let response = match self
            .http
            .get(&url)
            .header("Content-Type", "application/json")
            .header("Cookie", cookie)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "anti-bot fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "anti-bot service returned non-200");
            return None;
        }

        match response.json::<TokenResponse>().await {
            Ok(body) if body.code == 200 && !body.token.is_empty() => {
                debug!("anti-bot token obtained");
                Some(body.token)
            }
            Ok(body) => {
                warn!(code = body.code, message = %body.message, "anti-bot service declined");
                None
            }
            Err(e) => {
                warn!(error = %e, "anti-bot response was not valid JSON");
                None
            }
        }
    }
}
