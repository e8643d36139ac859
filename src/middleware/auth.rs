//! API secret authentication
//!
//! Clients present a secret either as `Authorization: Bearer <secret>` or
//! as `X-API-Key`. Secrets are checked against the configured allowlist
//! by comparing Sha256 digests, so the comparison cost does not depend on
//! where the strings diverge. An empty allowlist leaves the surface open.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::{error::AppError, AppState};

/// Extract the presented secret from either supported header.
fn presented_secret(request: &Request) -> Option<&str> {
    if let Some(auth) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return Some(token);
        }
    }
    request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
}

/// Digest-based equality, constant-time in the input contents.
fn secrets_match(a: &str, b: &str) -> bool {
    Sha256::digest(a.as_bytes()) == Sha256::digest(b.as_bytes())
}

/// Authentication middleware for the `/v1` surface.
pub async fn require_api_secret(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.config.api_secrets.is_empty() {
        return Ok(next.run(request).await);
    }

    let secret = presented_secret(&request).ok_or(AppError::Unauthorized)?;
    let allowed = state
        .config
        .api_secrets
        .iter()
        .any(|candidate| secrets_match(candidate, secret));
    if !allowed {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
