//! Authentication/authorization error taxonomy.
//!
//! Every failure the session subsystem can report maps to exactly one
//! [`AuthError`] variant. HTTP status mapping lives in the API crate; this
//! crate only assigns each kind a stable machine-readable [`AuthError::code`].
//!
//! Messages are safe to return to clients: they never contain secrets, full
//! tokens, or whether an email exists.

use thiserror::Error;

use crate::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no bearer token provided")]
    MissingToken,

    #[error("authorization header must have the form 'Bearer <token>'")]
    MalformedHeader,

    #[error("token has expired")]
    TokenExpired,

    #[error("token is malformed")]
    MalformedToken,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token issuer or audience is not accepted")]
    InvalidClaims,

    #[error("wrong token type")]
    WrongTokenType,

    #[error("token has been revoked")]
    Revoked,

    #[error("token is not recognized")]
    UnknownToken,

    #[error("refresh token reuse detected")]
    ReuseDetected,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("forbidden: requires role '{required}', but identity has role '{actual}'")]
    InsufficientRole { required: String, actual: String },

    #[error("forbidden: not the owner of this resource")]
    NotOwner,

    /// Infrastructure failure while verifying. The detail is logged, never
    /// returned to clients.
    #[error("internal verification error")]
    Internal(String),
}

impl AuthError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn insufficient_role(required: &Role, actual: &Role) -> Self {
        Self::InsufficientRole {
            required: required.as_str().to_string(),
            actual: actual.as_str().to_string(),
        }
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken | AuthError::MalformedHeader => "no_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::MalformedToken | AuthError::InvalidSignature | AuthError::InvalidClaims => {
                "invalid_token"
            }
            AuthError::WrongTokenType => "wrong_token_type",
            AuthError::Revoked | AuthError::UnknownToken => "token_revoked",
            AuthError::ReuseDetected => "token_reuse_detected",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InsufficientRole { .. } => "insufficient_role",
            AuthError::NotOwner => "forbidden",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Client-facing message (internal details are replaced).
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Internal(_) => "internal verification error".to_string(),
            other => other.to_string(),
        }
    }

    /// Failures of the token itself (format, crypto, claims, registry state),
    /// as opposed to header, credential, authorization or infrastructure errors.
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::TokenExpired
                | AuthError::MalformedToken
                | AuthError::InvalidSignature
                | AuthError::InvalidClaims
                | AuthError::WrongTokenType
                | AuthError::Revoked
                | AuthError::UnknownToken
                | AuthError::ReuseDetected
        )
    }
}

/// Short, log-safe prefix of a token.
pub fn token_fingerprint(token: &str) -> &str {
    match token.char_indices().nth(8) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_has_distinct_code() {
        assert_eq!(AuthError::TokenExpired.code(), "token_expired");
        assert_ne!(AuthError::TokenExpired.code(), AuthError::InvalidSignature.code());
        assert_ne!(AuthError::TokenExpired.code(), AuthError::MissingToken.code());
    }

    #[test]
    fn insufficient_role_names_both_roles() {
        let err = AuthError::insufficient_role(&Role::admin(), &Role::user());
        let msg = err.to_string();
        assert!(msg.contains("'admin'"));
        assert!(msg.contains("'user'"));
    }

    #[test]
    fn internal_detail_is_not_public() {
        let err = AuthError::internal("connection refused to 10.0.0.3");
        assert!(!err.public_message().contains("10.0.0.3"));
    }

    #[test]
    fn fingerprint_is_short_and_char_safe() {
        assert_eq!(token_fingerprint("eyJhbGciOiJIUzI1NiJ9.x.y"), "eyJhbGci");
        assert_eq!(token_fingerprint("abc"), "abc");
        assert_eq!(token_fingerprint("ééééééééééé"), "éééééééé");
    }
}
