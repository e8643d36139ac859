//! Message preprocessing
//!
//! Before a request goes upstream, every `image_url` part in the history
//! is materialized: remote URLs are fetched, base64 payloads decoded, and
//! the bytes either inlined as a data URL (images) or pushed through the
//! upstream blob-upload handshake (everything else) and rewritten to a
//! `private_file` part.

use base64::Engine;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::openai::{request::ImageUrl, ChatMessage, Content, ContentPart, PrivateFile};
use crate::upstream::UpstreamClient;

/// Sniff an image MIME type from magic bytes, `None` for non-images.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    }
}

/// Resolve an `image_url` reference to raw bytes.
///
/// Accepts http(s) URLs, `data:...;base64,` URLs, and bare base64.
pub async fn resolve_url_bytes(upstream: &UpstreamClient, url: &str) -> AppResult<Vec<u8>> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(upstream.fetch_bytes(url).await?.to_vec());
    }
    let payload = match url.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => url,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::BadRequest(format!("image_url is neither a URL nor base64: {e}")))
}

/// Turn resolved bytes into the part the upstream should see.
async fn part_for_bytes(
    upstream: &UpstreamClient,
    cookie: &str,
    bytes: Vec<u8>,
) -> AppResult<ContentPart> {
    if sniff_image_mime(&bytes).is_some() {
        let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
        return Ok(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/jpeg;base64,{data}"),
            },
        });
    }

    // Not an image: push through the private-storage handshake.
    let target = upstream.upload_target(cookie).await?;
    upstream.put_blob(&target.upload_image_url, bytes.clone()).await?;
    debug!(size = bytes.len(), "attachment uploaded to private storage");

    Ok(ContentPart::PrivateFile {
        private_file: PrivateFile {
            name: "file".to_string(),
            mime_type: "application/octet-stream".to_string(),
            size: bytes.len(),
            ext: "bin".to_string(),
            private_storage_url: target.private_storage_url,
        },
    })
}

/// Inline every `image_url` part across the message history.
pub async fn inline_attachments(
    upstream: &UpstreamClient,
    cookie: &str,
    messages: &mut [ChatMessage],
) -> AppResult<()> {
    for message in messages.iter_mut() {
        let Some(Content::Parts(parts)) = &mut message.content else {
            continue;
        };
        for part in parts.iter_mut() {
            let ContentPart::ImageUrl { image_url } = part else {
                continue;
            };
            if image_url.url.starts_with("data:") {
                continue;
            }
            match resolve_url_bytes(upstream, &image_url.url).await {
                Ok(bytes) => {
                    *part = part_for_bytes(upstream, cookie, bytes).await?;
                }
                Err(e) => {
                    warn!(error = %e, "attachment resolution failed");
                    return Err(e);
                }
            }
        }
    }
    Ok(())
}

/// Resolve an optional base image for generation requests to a data URL.
pub async fn base_image_data_url(
    upstream: &UpstreamClient,
    image: &str,
) -> AppResult<Option<String>> {
    if image.starts_with("data:image") {
        return Ok(Some(image.to_string()));
    }
    let bytes = resolve_url_bytes(upstream, image).await?;
    if sniff_image_mime(&bytes).is_none() {
        return Ok(None);
    }
    let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(Some(format!("data:image/jpeg;base64,{data}")))
}
