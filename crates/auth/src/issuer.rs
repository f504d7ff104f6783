//! Token issuance.
//!
//! Access tokens are pure: sign and return. Refresh tokens are a unit of
//! signing *and* registry persistence: the signed token is only handed out
//! once its registry entry exists, so no usable refresh token ever lacks a
//! row. Signing happens first; if it fails no row is written.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;

use sessiongate_core::{Clock, TokenId};

use crate::claims::{AccessClaims, RefreshClaims, TokenClaims};
use crate::config::TokenConfig;
use crate::registry::{RefreshTokenRegistry, RegistryEntry};
use crate::{AuthError, Identity};

/// The only signing algorithm this subsystem issues or accepts.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// A freshly minted refresh token and its registry key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub jti: TokenId,
    pub expires_at: DateTime<Utc>,
}

/// Response body of login and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

pub struct TokenIssuer {
    access_key: EncodingKey,
    refresh_key: EncodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    registry: Arc<dyn RefreshTokenRegistry>,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(
        config: &TokenConfig,
        registry: Arc<dyn RefreshTokenRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            access_key: EncodingKey::from_secret(config.access_secret.expose()),
            refresh_key: EncodingKey::from_secret(config.refresh_secret.expose()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl: Duration::seconds(config.access_ttl_secs()),
            refresh_ttl: Duration::seconds(config.refresh_ttl_secs()),
            registry,
            clock,
        }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn generate_access_token(&self, identity: &Identity) -> Result<String, AuthError> {
        let now = self.clock.now();
        let claims = TokenClaims::Access(AccessClaims {
            sub: identity.id,
            email: identity.email.clone(),
            role: identity.role.clone(),
            name: identity.name.clone(),
            iat: now.timestamp(),
            exp: expiry(now, self.access_ttl)?.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        });
        self.sign(&claims, &self.access_key)
    }

    /// Mint a refresh token and register it.
    pub async fn generate_refresh_token(
        &self,
        identity: &Identity,
    ) -> Result<IssuedRefreshToken, AuthError> {
        let (issued, entry) = self.sign_refresh(identity)?;
        self.registry.create(entry).await?;
        tracing::debug!(subject = %identity.id, jti = %issued.jti, "refresh token registered");
        Ok(issued)
    }

    pub async fn generate_token_pair(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        let access_token = self.generate_access_token(identity)?;
        let refresh = self.generate_refresh_token(identity).await?;
        Ok(self.pair(access_token, refresh))
    }

    /// Replace `old_jti` with a new refresh token (single use).
    ///
    /// The successor is signed first and only returned if the registry accepted
    /// the rotation; a losing or failed rotation discards it.
    pub async fn rotate_refresh_token(
        &self,
        old_jti: TokenId,
        identity: &Identity,
    ) -> Result<IssuedRefreshToken, AuthError> {
        let (issued, entry) = self.sign_refresh(identity)?;
        self.registry.rotate(old_jti, identity.id, entry).await?;
        tracing::debug!(subject = %identity.id, old_jti = %old_jti, new_jti = %issued.jti, "refresh token rotated");
        Ok(issued)
    }

    pub fn pair(&self, access_token: String, refresh: IssuedRefreshToken) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token: refresh.token,
            token_type: TOKEN_TYPE_BEARER,
            expires_in: self.access_ttl_secs(),
        }
    }

    fn sign_refresh(&self, identity: &Identity) -> Result<(IssuedRefreshToken, RegistryEntry), AuthError> {
        let now = self.clock.now();
        let expires_at = expiry(now, self.refresh_ttl)?;
        let jti = TokenId::new();
        let claims = TokenClaims::Refresh(RefreshClaims {
            sub: identity.id,
            jti,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        });
        let token = self.sign(&claims, &self.refresh_key)?;
        let entry = RegistryEntry::new(jti, identity.id, now, expires_at);
        Ok((
            IssuedRefreshToken {
                token,
                jti,
                expires_at,
            },
            entry,
        ))
    }

    fn sign(&self, claims: &TokenClaims, key: &EncodingKey) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(SIGNING_ALGORITHM), claims, key)
            .map_err(|e| AuthError::internal(format!("token signing failed: {e}")))
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, AuthError> {
    now.checked_add_signed(ttl)
        .ok_or_else(|| AuthError::internal("token expiry out of range"))
}

impl core::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use sessiongate_core::{ManualClock, UserId};

    use super::*;
    use crate::config::test_support::test_config;
    use crate::{InMemoryRefreshRegistry, Role};

    fn issuer() -> (TokenIssuer, Arc<InMemoryRefreshRegistry>) {
        let registry = Arc::new(InMemoryRefreshRegistry::new());
        let clock = Arc::new(ManualClock::starting_now());
        (TokenIssuer::new(&test_config(), registry.clone(), clock), registry)
    }

    fn grace() -> Identity {
        Identity::new(UserId::new(), "grace@example.com", Role::admin(), "Grace Hopper")
    }

    #[tokio::test]
    async fn refresh_token_is_registered_before_it_is_returned() {
        let (issuer, registry) = issuer();
        let identity = grace();
        let issued = issuer.generate_refresh_token(&identity).await.unwrap();

        let entry = registry.find(issued.jti).await.unwrap().unwrap();
        assert_eq!(entry.subject, identity.id);
        assert_eq!(entry.expires_at, issued.expires_at);
        assert!(!entry.revoked);
    }

    #[tokio::test]
    async fn token_pair_has_bearer_shape() {
        let (issuer, registry) = issuer();
        let pair = issuer.generate_token_pair(&grace()).await.unwrap();

        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 15 * 60);
        assert_ne!(pair.access_token, pair.refresh_token);
        assert_eq!(registry.len(), 1);

        let body = serde_json::to_value(&pair).unwrap();
        for key in ["accessToken", "refreshToken", "tokenType", "expiresIn"] {
            assert!(body.get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn failed_rotation_hands_out_nothing() {
        let (issuer, registry) = issuer();
        let identity = grace();
        let first = issuer.generate_refresh_token(&identity).await.unwrap();
        issuer.rotate_refresh_token(first.jti, &identity).await.unwrap();

        let err = issuer.rotate_refresh_token(first.jti, &identity).await.unwrap_err();
        assert_eq!(err, AuthError::ReuseDetected);
        // Original plus exactly one successor.
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn expiry_overflow_is_an_error_not_a_panic() {
        let registry = Arc::new(InMemoryRefreshRegistry::new());
        let clock = Arc::new(ManualClock::new(DateTime::<Utc>::MAX_UTC - Duration::days(1)));
        let issuer = TokenIssuer::new(&test_config(), registry.clone(), clock);

        let err = issuer.generate_token_pair(&grace()).await.unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
        assert_eq!(registry.len(), 0);
    }
}
