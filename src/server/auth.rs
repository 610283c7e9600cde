//! Bearer-token authentication for the API surface.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;

use super::AppState;
use crate::models::ErrorResponse;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingHeader,
    NotBearer,
    EmptyToken,
    UnknownKey,
}

impl AuthError {
    /// Short cause for the error body.
    pub fn error(self) -> &'static str {
        match self {
            Self::MissingHeader => "Authorization header required",
            Self::NotBearer => "Bearer token required",
            Self::EmptyToken => "Empty token",
            Self::UnknownKey => "Invalid API key",
        }
    }

    /// Human-readable detail for the error body.
    pub fn message(self) -> &'static str {
        match self {
            Self::MissingHeader => "Please provide an Authorization header with Bearer token",
            Self::NotBearer => "Authorization header must use Bearer token format",
            Self::EmptyToken => "Bearer token cannot be empty",
            Self::UnknownKey => "The provided API key is not valid",
        }
    }
}

/// Check an `Authorization` header value against the accepted key set. The
/// token is compared literally after trimming surrounding whitespace.
pub fn authorize(header: Option<&str>, api_keys: &[String]) -> Result<(), AuthError> {
    let header = header.ok_or(AuthError::MissingHeader)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::NotBearer)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::EmptyToken);
    }
    if api_keys.iter().any(|key| key == token) {
        Ok(())
    } else {
        Err(AuthError::UnknownKey)
    }
}

/// Middleware guarding every route it is layered onto; `/health` is
/// registered outside it.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match authorize(header, &state.api_keys) {
        Ok(()) => Ok(next.run(request).await),
        Err(err) => Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(err.error(), err.message())),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<String> {
        vec!["key-one".into(), "key-two".into()]
    }

    #[test]
    fn accepts_any_configured_key() {
        assert_eq!(authorize(Some("Bearer key-one"), &keys()), Ok(()));
        assert_eq!(authorize(Some("Bearer key-two"), &keys()), Ok(()));
    }

    #[test]
    fn trims_whitespace_around_token() {
        assert_eq!(authorize(Some("Bearer  key-one "), &keys()), Ok(()));
    }

    #[test]
    fn rejects_missing_header() {
        assert_eq!(authorize(None, &keys()), Err(AuthError::MissingHeader));
    }

    #[test]
    fn rejects_non_bearer_scheme() {
        assert_eq!(
            authorize(Some("Basic a2V5LW9uZQ=="), &keys()),
            Err(AuthError::NotBearer)
        );
        assert_eq!(authorize(Some("key-one"), &keys()), Err(AuthError::NotBearer));
    }

    #[test]
    fn rejects_empty_token() {
        assert_eq!(authorize(Some("Bearer   "), &keys()), Err(AuthError::EmptyToken));
    }

    #[test]
    fn rejects_unknown_token() {
        assert_eq!(
            authorize(Some("Bearer nope"), &keys()),
            Err(AuthError::UnknownKey)
        );
    }
}
