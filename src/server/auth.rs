use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use tracing::warn;

use super::AppState;
use super::dto::ApiError;
use crate::error::McError;

/// Reject requests without the configured bearer token.
///
/// Passes everything through when no token is configured.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        return next.run(request).await;
    };

    let authorized =
        extract_bearer_token(&request).is_some_and(|token| tokens_match(token, expected));
    if authorized {
        return next.run(request).await;
    }
    warn!(path = %request.uri().path(), "Rejected request with missing or invalid token");
    ApiError::from(McError::Authentication).into_response()
}

fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Compare digests so the comparison time does not depend on where the
/// strings first differ.
fn tokens_match(provided: &str, expected: &str) -> bool {
    Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}
