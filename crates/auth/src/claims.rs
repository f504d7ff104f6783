//! Token payload schema.
//!
//! On the wire a payload is a JSON object discriminated by its `type` field.
//! Decoding is strict: the `type` must be known, every required field must be
//! present, and unknown fields are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use sessiongate_core::{TokenId, UserId};

use crate::{Identity, Role};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }

    pub fn other(self) -> Self {
        match self {
            TokenType::Access => TokenType::Refresh,
            TokenType::Refresh => TokenType::Access,
        }
    }
}

impl core::fmt::Display for TokenType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims of a short-lived access token.
///
/// Carries identity fields only, never secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessClaims {
    pub sub: UserId,
    pub email: String,
    pub role: Role,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl AccessClaims {
    pub fn identity(&self) -> Identity {
        Identity::new(self.sub, self.email.clone(), self.role.clone(), self.name.clone())
    }
}

/// Claims of a refresh token. Business validity lives in the registry, keyed by `jti`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshClaims {
    pub sub: UserId,
    pub jti: TokenId,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// A decoded payload, tagged by token type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TokenClaims {
    Access(AccessClaims),
    Refresh(RefreshClaims),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsSchemaError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no 'type' field")]
    MissingType,

    #[error("unknown token type '{0}'")]
    UnknownType(String),

    #[error("token type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: TokenType, found: TokenType },

    #[error("payload does not match the {0} schema: {1}")]
    Schema(TokenType, String),
}

impl TokenClaims {
    pub fn token_type(&self) -> TokenType {
        match self {
            TokenClaims::Access(_) => TokenType::Access,
            TokenClaims::Refresh(_) => TokenType::Refresh,
        }
    }

    pub fn issued_at(&self) -> i64 {
        match self {
            TokenClaims::Access(c) => c.iat,
            TokenClaims::Refresh(c) => c.iat,
        }
    }

    pub fn expires_at(&self) -> i64 {
        match self {
            TokenClaims::Access(c) => c.exp,
            TokenClaims::Refresh(c) => c.exp,
        }
    }

    /// Read only the `type` discriminator of a raw payload.
    pub fn peek_type(payload: &Value) -> Result<TokenType, ClaimsSchemaError> {
        let obj = payload.as_object().ok_or(ClaimsSchemaError::NotAnObject)?;
        let raw = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ClaimsSchemaError::MissingType)?;
        match raw {
            "access" => Ok(TokenType::Access),
            "refresh" => Ok(TokenType::Refresh),
            other => Err(ClaimsSchemaError::UnknownType(other.to_string())),
        }
    }

    /// Strictly decode a raw payload, requiring it to be of `expected` type.
    pub fn from_payload(payload: Value, expected: TokenType) -> Result<Self, ClaimsSchemaError> {
        let found = Self::peek_type(&payload)?;
        if found != expected {
            return Err(ClaimsSchemaError::TypeMismatch { expected, found });
        }

        let Value::Object(mut obj) = payload else {
            return Err(ClaimsSchemaError::NotAnObject);
        };
        obj.remove("type");
        let body = Value::Object(obj);

        match expected {
            TokenType::Access => serde_json::from_value::<AccessClaims>(body)
                .map(TokenClaims::Access)
                .map_err(|e| ClaimsSchemaError::Schema(expected, e.to_string())),
            TokenType::Refresh => serde_json::from_value::<RefreshClaims>(body)
                .map(TokenClaims::Refresh)
                .map_err(|e| ClaimsSchemaError::Schema(expected, e.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the time window of a token.
///
/// All values are unix seconds; `leeway` widens both edges.
pub fn validate_times(iat: i64, exp: i64, now: i64, leeway: i64) -> Result<(), TokenValidationError> {
    if exp <= iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now.saturating_add(leeway) < iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= exp.saturating_add(leeway) {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
