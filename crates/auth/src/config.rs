//! Token configuration schema and validation.
//!
//! Values are always supplied from outside (see `sessiongate-infra::config`);
//! this module only defines the shape and the rules a usable configuration
//! must satisfy.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum HS256 secret length in bytes (the HMAC-SHA256 block output size).
pub const MIN_SECRET_LEN: usize = 32;

/// Upper bound for token lifetimes (ten years).
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// Symmetric signing secret. `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl core::fmt::Debug for Secret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Secret([redacted; {} bytes])", self.0.len())
    }
}

/// What to do when a rotated-away refresh token is presented again.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReusePolicy {
    /// Only the implicated token is dead (it already is); nothing else changes.
    RevokeTokenOnly,
    /// Revoke every outstanding refresh token of the subject.
    #[default]
    RevokeAllForSubject,
}

impl core::str::FromStr for ReusePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "revoke_token_only" | "token" => Ok(Self::RevokeTokenOnly),
            "revoke_all_for_subject" | "subject" | "all" => Ok(Self::RevokeAllForSubject),
            other => Err(ConfigError::Invalid {
                field: "reuse_policy",
                reason: format!("unknown policy '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(&'static str),

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Everything the issuer, verifier and session controller need.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: Secret,
    pub refresh_secret: Secret,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
    pub audience: String,
    /// Clock-skew tolerance applied to `exp`/`iat` checks.
    pub leeway: Duration,
    /// Upper bound for any single registry call.
    pub registry_timeout: Duration,
    pub reuse_policy: ReusePolicy,
}

impl TokenConfig {
    pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(0);
    pub const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(
        access_secret: Secret,
        refresh_secret: Secret,
        access_ttl: Duration,
        refresh_ttl: Duration,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl,
            refresh_ttl,
            issuer: issuer.into(),
            audience: audience.into(),
            leeway: Self::DEFAULT_LEEWAY,
            registry_timeout: Self::DEFAULT_REGISTRY_TIMEOUT,
            reuse_policy: ReusePolicy::default(),
        }
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn with_registry_timeout(mut self, timeout: Duration) -> Self {
        self.registry_timeout = timeout;
        self
    }

    pub fn with_reuse_policy(mut self, policy: ReusePolicy) -> Self {
        self.reuse_policy = policy;
        self
    }

    /// Check the configuration is safe to run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::invalid(
                "access_secret",
                format!("must be at least {MIN_SECRET_LEN} bytes"),
            ));
        }
        if self.refresh_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::invalid(
                "refresh_secret",
                format!("must be at least {MIN_SECRET_LEN} bytes"),
            ));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::invalid(
                "refresh_secret",
                "must differ from access_secret",
            ));
        }
        if self.access_ttl.is_zero() {
            return Err(ConfigError::invalid("access_ttl", "must be positive"));
        }
        if self.refresh_ttl > MAX_TTL {
            return Err(ConfigError::invalid(
                "refresh_ttl",
                format!("must not exceed {} seconds", MAX_TTL.as_secs()),
            ));
        }
        if self.refresh_ttl <= self.access_ttl {
            return Err(ConfigError::invalid(
                "refresh_ttl",
                "must be longer than access_ttl",
            ));
        }
        if self.leeway >= self.access_ttl {
            return Err(ConfigError::invalid("leeway", "must be shorter than access_ttl"));
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Missing("issuer"));
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::Missing("audience"));
        }
        if self.registry_timeout.is_zero() {
            return Err(ConfigError::invalid("registry_timeout", "must be positive"));
        }
        Ok(())
    }

    pub fn access_ttl_secs(&self) -> i64 {
        capped_secs(self.access_ttl)
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        capped_secs(self.refresh_ttl)
    }

    pub fn leeway_secs(&self) -> i64 {
        capped_secs(self.leeway)
    }
}

/// Whole seconds, saturating at [`MAX_TTL`] for unvalidated configs.
fn capped_secs(duration: Duration) -> i64 {
    i64::try_from(duration.min(MAX_TTL).as_secs()).unwrap_or(i64::MAX)
}
