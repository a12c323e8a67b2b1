//! Authentication extractor.
//!
//! Document endpoints require `Authorization: Bearer <token>`. With
//! `AUTH_SECRET` configured the token must match it; otherwise any
//! non-empty token is accepted.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use subtle::ConstantTimeEq;

use crate::AppState;

/// Caller that presented an acceptable bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser;

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        check_bearer(header, state.config.auth_secret.as_deref())?;
        Ok(AuthUser)
    }
}

/// Validate an `Authorization` header value against the configured secret.
fn check_bearer<'a>(
    header: Option<&'a str>,
    secret: Option<&str>,
) -> Result<&'a str, (StatusCode, &'static str)> {
    let header = header.ok_or((StatusCode::UNAUTHORIZED, "Missing authorization header"))?;
    let token = header.strip_prefix("Bearer ").ok_or((
        StatusCode::UNAUTHORIZED,
        "Invalid authorization header format",
    ))?;
    let token = token.trim();

    if token.is_empty() {
        return Err((StatusCode::UNAUTHORIZED, "Empty bearer token"));
    }
    match secret {
        Some(secret) if !tokens_match(token, secret) => {
            Err((StatusCode::UNAUTHORIZED, "Invalid bearer token"))
        }
        _ => Ok(token),
    }
}

/// Compare in time independent of where the first differing byte is.
/// Only the length can leak.
fn tokens_match(token: &str, secret: &str) -> bool {
    token.as_bytes().ct_eq(secret.as_bytes()).into()
}
