//! Upstream HTTP + SSE client
//!
//! All upstream traffic goes through one pooled reqwest client carrying
//! the fixed browser header set the upstream expects, the selected
//! credential cookie, and the configured outbound proxy. Streaming
//! endpoints come back as a line stream re-assembled from the byte
//! stream; unary endpoints come back as full bodies.

use std::pin::Pin;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

use super::sse::SseLineBuffer;

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome";

const ASK_PATH: &str = "/api/copilot/ask";
const LOGIN_PATH: &str = "/api/is_login";
const DELETE_PATH: &str = "/api/project/delete";
const UPLOAD_PATH: &str = "/api/get_upload_personal_image_url";
const TASK_STATUS_PATH: &str = "/api/ig_tasks_status";

const ASK_TIMEOUT: Duration = Duration::from_secs(3600);
const SHORT_TIMEOUT: Duration = Duration::from_secs(30);
const FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Lazily produced upstream SSE lines
pub type LineStream = Pin<Box<dyn Stream<Item = AppResult<String>> + Send>>;

/// Login probe result
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoginStatus {
    #[serde(default)]
    pub is_login: bool,
    #[serde(default)]
    pub cogen_email: String,
}

#[derive(Debug, Deserialize)]
struct LoginEnvelope {
    #[serde(default)]
    data: LoginStatus,
}

/// Upload handshake result
#[derive(Debug, Clone, Deserialize)]
pub struct UploadTarget {
    pub upload_image_url: String,
    pub private_storage_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadEnvelope {
    data: UploadTarget,
}

/// Client for every upstream endpoint
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(base_url: &str, proxy_url: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(16)
            .connect_timeout(Duration::from_secs(20));
        if let Some(proxy) = proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("Invalid proxy URL")?);
        }
        Ok(Self {
            http: builder.build().context("Failed to build upstream client")?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn post(&self, path: &str, cookie: &str, accept: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{path}", self.base_url))
            .header("Content-Type", "application/json")
            .header("Accept", accept)
            .header("Origin", &self.base_url)
            .header("Referer", format!("{}/", self.base_url))
            .header("Cookie", cookie)
            .header("User-Agent", USER_AGENT)
    }

    fn get(&self, path: &str, cookie: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{path}", self.base_url))
            .header("Accept", "application/json")
            .header("Origin", &self.base_url)
            .header("Referer", format!("{}/", self.base_url))
            .header("Cookie", cookie)
            .header("User-Agent", USER_AGENT)
    }

    /// Open a streaming ask call and hand back its SSE lines.
    pub async fn ask_stream(&self, cookie: &str, body: &serde_json::Value) -> AppResult<LineStream> {
        let response = self
            .post(ASK_PATH, cookie, "text/event-stream")
            .timeout(ASK_TIMEOUT)
            .json(body)
            .send()
            .await?;
        debug!(status = %response.status(), "ask stream opened");
        Ok(line_stream(response))
    }

    /// Unary ask call returning the whole body, SSE framing included.
    pub async fn ask(&self, cookie: &str, body: &serde_json::Value) -> AppResult<String> {
        let response = self
            .post(ASK_PATH, cookie, "application/json")
            .timeout(ASK_TIMEOUT)
            .json(body)
            .send()
            .await?;
        Ok(response.text().await?)
    }

    /// Poll image/video task status as an SSE line stream.
    pub async fn task_status_stream(&self, cookie: &str, task_ids: &[String]) -> AppResult<LineStream> {
        let response = self
            .post(TASK_STATUS_PATH, cookie, "*/*")
            .timeout(ASK_TIMEOUT)
            .json(&json!({ "task_ids": task_ids }))
            .send()
            .await?;
        Ok(line_stream(response))
    }

    /// Best-effort project teardown.
    pub async fn delete_project(&self, cookie: &str, project_id: &str) -> AppResult<()> {
        let response = self
            .get(DELETE_PATH, cookie)
            .query(&[("project_id", project_id)])
            .timeout(SHORT_TIMEOUT)
            .send()
            .await?;
        if response.status().is_success() {
            debug!(project_id, "upstream session deleted");
        } else {
            warn!(project_id, status = %response.status(), "session delete rejected");
        }
        Ok(())
    }

    /// Probe credential liveness. Failures are reported, never fatal.
    pub async fn check_login(&self, cookie: &str) -> AppResult<LoginStatus> {
        let response = self
            .get(LOGIN_PATH, cookie)
            .timeout(SHORT_TIMEOUT)
            .send()
            .await?;
        let envelope: LoginEnvelope = response.json().await?;
        Ok(envelope.data)
    }

    /// Ask upstream for a blob upload slot.
    pub async fn upload_target(&self, cookie: &str) -> AppResult<UploadTarget> {
        let response = self
            .get(UPLOAD_PATH, cookie)
            .timeout(SHORT_TIMEOUT)
            .send()
            .await?;
        let envelope: UploadEnvelope = response.json().await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to extract upload target: {e}"))
        })?;
        Ok(envelope.data)
    }

    /// Upload bytes to the handshake-provided URL.
    pub async fn put_blob(&self, upload_url: &str, bytes: Vec<u8>) -> AppResult<()> {
        let response = self
            .http
            .put(upload_url)
            .header("Accept", "*/*")
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", "application/octet-stream")
            .header("Origin", &self.base_url)
            .header("User-Agent", USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Blob upload failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Fetch arbitrary bytes (remote attachments, generated images).
    pub async fn fetch_bytes(&self, url: &str) -> AppResult<Bytes> {
        let response = self.http.get(url).timeout(FETCH_TIMEOUT).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Fetch of {url} returned status {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?)
    }
}

/// Turn a streaming response into complete SSE lines.
fn line_stream(response: reqwest::Response) -> LineStream {
    let stream = async_stream::stream! {
        let mut buffer = SseLineBuffer::new();
        let mut bytes = response.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for line in buffer.feed(&chunk) {
                        yield Ok(line);
                    }
                }
                Err(e) => {
                    yield Err(AppError::Transport(e));
                    return;
                }
            }
        }
        let rest = buffer.take_remaining();
        if !rest.is_empty() {
            yield Ok(rest);
        }
    };
    Box::pin(stream)
}
