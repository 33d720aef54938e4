//! Bearer token check for the internal control API.

use crate::api::ApiError;
use crate::AppState;
use axum::{
    body::Body, extract::Request, http::header::AUTHORIZATION, middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Rejects requests whose `Authorization: Bearer <token>` does not match
/// the configured token. With no token configured every request is rejected.
pub async fn auth_middleware(req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or_else(|| ApiError::InternalServerError("application state missing".to_string()))?
        .clone();

    if state.api_bearer_token.is_empty() {
        tracing::warn!(
            path = %req.uri().path(),
            "internal api token is not configured, rejecting request"
        );
        return Err(ApiError::Unauthorized);
    }

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(ApiError::Unauthorized)?;

    if !constant_time_eq(token.as_bytes(), state.api_bearer_token.as_bytes()) {
        tracing::warn!(path = %req.uri().path(), "invalid bearer token");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(req).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::constant_time_eq;

    #[test]
    fn compares_tokens() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
        assert!(!constant_time_eq(b"", b"x"));
    }
}
