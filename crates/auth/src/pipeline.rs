//! Per-request authentication, as a pure function.
//!
//! `NoHeader -> HasHeader -> Extracted -> Authenticated | Rejected(kind)`
//!
//! The HTTP layer calls [`authenticate`] with the raw `Authorization` header
//! and either continues with the returned identity or short-circuits with the
//! error's response.

use crate::{AuthError, Identity, TokenVerifier};

pub const BEARER_PREFIX: &str = "Bearer ";

/// How far a request got through authentication (for logs).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthenticationStage {
    NoHeader,
    HasHeader,
    Extracted,
    Authenticated,
}

/// Extract the token from an `Authorization` header value.
///
/// Only the exact form `Bearer <token>` is accepted: one space, no
/// surrounding whitespace, no whitespace inside the token.
pub fn extract_bearer(header: &str) -> Result<&str, AuthError> {
    let token = header
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthError::MalformedHeader)?;

    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err(AuthError::MalformedHeader);
    }

    Ok(token)
}

/// Authenticate a request from its `Authorization` header.
pub fn authenticate(header: Option<&str>, verifier: &TokenVerifier) -> Result<Identity, AuthError> {
    let mut stage = AuthenticationStage::NoHeader;
    let result = run(header, verifier, &mut stage);
    if let Err(err) = &result {
        tracing::debug!(stage = ?stage, code = err.code(), "request authentication rejected");
    }
    result
}

fn run(
    header: Option<&str>,
    verifier: &TokenVerifier,
    stage: &mut AuthenticationStage,
) -> Result<Identity, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    *stage = AuthenticationStage::HasHeader;

    let token = extract_bearer(header)?;
    *stage = AuthenticationStage::Extracted;

    let claims = verifier.verify_access_token(token)?;
    *stage = AuthenticationStage::Authenticated;

    Ok(claims.identity())
}
