//! Token verification.
//!
//! Verification order for a presented token:
//! 1. Signature with the expected type's secret, HS256 only. Any other
//!    algorithm is rejected before the payload is looked at.
//! 2. `iss` / `aud` against configuration.
//! 3. Payload schema (tagged by `type`; unknown or missing fields rejected).
//! 4. Time window against the injected clock, with configured leeway.
//! 5. Refresh tokens only: registry state of the `jti`.
//!
//! Access and refresh tokens are signed with different secrets. A token whose
//! signature fails under the expected secret but verifies under the other one
//! is reported as [`AuthError::WrongTokenType`], not as a bad signature.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, Validation};
use serde_json::Value;

use sessiongate_core::Clock;

use crate::claims::{validate_times, AccessClaims, ClaimsSchemaError, RefreshClaims, TokenClaims, TokenType, TokenValidationError};
use crate::config::TokenConfig;
use crate::error::token_fingerprint;
use crate::issuer::SIGNING_ALGORITHM;
use crate::registry::RefreshTokenRegistry;
use crate::AuthError;

pub struct TokenVerifier {
    access_key: DecodingKey,
    refresh_key: DecodingKey,
    validation: Validation,
    leeway: i64,
    registry: Arc<dyn RefreshTokenRegistry>,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    pub fn new(
        config: &TokenConfig,
        registry: Arc<dyn RefreshTokenRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        // Time is checked against our own clock after decoding.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        Self {
            access_key: DecodingKey::from_secret(config.access_secret.expose()),
            refresh_key: DecodingKey::from_secret(config.refresh_secret.expose()),
            validation,
            leeway: config.leeway_secs(),
            registry,
            clock,
        }
    }

    /// Verify a token of the given type (no registry lookup).
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<TokenClaims, AuthError> {
        self.decode(token, expected, true)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        match self.verify(token, TokenType::Access) {
            Ok(TokenClaims::Access(claims)) => Ok(claims),
            Ok(TokenClaims::Refresh(_)) => Err(AuthError::WrongTokenType),
            Err(err) => {
                tracing::debug!(token = token_fingerprint(token), error = %err, "access token rejected");
                Err(err)
            }
        }
    }

    /// Cryptographic verification plus registry status.
    pub async fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let claims = match self.verify(token, TokenType::Refresh) {
            Ok(TokenClaims::Refresh(claims)) => claims,
            Ok(TokenClaims::Access(_)) => return Err(AuthError::WrongTokenType),
            Err(err) => {
                tracing::debug!(token = token_fingerprint(token), error = %err, "refresh token rejected");
                return Err(err);
            }
        };

        let entry = self.registry.find(claims.jti).await?;
        match entry {
            None => Err(AuthError::UnknownToken),
            Some(entry) if entry.subject != claims.sub => {
                tracing::warn!(jti = %claims.jti, "refresh token subject does not match registry");
                Err(AuthError::UnknownToken)
            }
            Some(entry) if entry.was_rotated() => {
                tracing::warn!(jti = %claims.jti, subject = %claims.sub, "rotated refresh token presented again");
                Err(AuthError::ReuseDetected)
            }
            Some(entry) if entry.revoked => Err(AuthError::Revoked),
            Some(_) => Ok(claims),
        }
    }

    /// Signature and schema check that tolerates expiry; used by logout.
    pub fn decode_refresh_for_logout(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        match self.decode(token, TokenType::Refresh, false)? {
            TokenClaims::Refresh(claims) => Ok(claims),
            TokenClaims::Access(_) => Err(AuthError::WrongTokenType),
        }
    }

    fn key_for(&self, token_type: TokenType) -> &DecodingKey {
        match token_type {
            TokenType::Access => &self.access_key,
            TokenType::Refresh => &self.refresh_key,
        }
    }

    fn decode(&self, token: &str, expected: TokenType, check_time: bool) -> Result<TokenClaims, AuthError> {
        let payload = match jsonwebtoken::decode::<Value>(token, self.key_for(expected), &self.validation) {
            Ok(data) => data.claims,
            Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => {
                let other = expected.other();
                return match jsonwebtoken::decode::<Value>(token, self.key_for(other), &self.validation) {
                    Ok(_) => Err(AuthError::WrongTokenType),
                    Err(_) => Err(AuthError::InvalidSignature),
                };
            }
            Err(e) => return Err(map_jwt_error(e.kind())),
        };

        let claims = TokenClaims::from_payload(payload, expected).map_err(|e| match e {
            ClaimsSchemaError::TypeMismatch { .. } => AuthError::WrongTokenType,
            _ => AuthError::MalformedToken,
        })?;

        if check_time {
            let now = self.clock.now().timestamp();
            validate_times(claims.issued_at(), claims.expires_at(), now, self.leeway).map_err(|e| match e {
                TokenValidationError::Expired => AuthError::TokenExpired,
                TokenValidationError::NotYetValid | TokenValidationError::InvalidTimeWindow => {
                    AuthError::MalformedToken
                }
            })?;
        }

        Ok(claims)
    }
}

fn map_jwt_error(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::MissingAlgorithm => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => AuthError::InvalidClaims,
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::MalformedToken,
    }
}

impl core::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use proptest::prelude::*;
    use serde_json::json;

    use sessiongate_core::{ManualClock, TokenId, UserId};

    use super::*;
    use crate::config::test_support::test_config;
    use crate::config::Secret;
    use crate::{Identity, InMemoryRefreshRegistry, Role, TokenIssuer};

    struct Fixture {
        clock: Arc<ManualClock>,
        registry: Arc<InMemoryRefreshRegistry>,
        issuer: TokenIssuer,
        verifier: TokenVerifier,
        config: TokenConfig,
    }

    fn fixture() -> Fixture {
        fixture_with(test_config())
    }

    fn fixture_with(config: TokenConfig) -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let registry = Arc::new(InMemoryRefreshRegistry::new());
        let issuer = TokenIssuer::new(&config, registry.clone(), clock.clone());
        let verifier = TokenVerifier::new(&config, registry.clone(), clock.clone());
        Fixture {
            clock,
            registry,
            issuer,
            verifier,
            config,
        }
    }

    fn ada() -> Identity {
        Identity::new(UserId::new(), "ada@example.com", Role::user(), "Ada Lovelace")
    }

    fn forge(secret: &[u8], alg: Algorithm, payload: &Value) -> String {
        jsonwebtoken::encode(&Header::new(alg), payload, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[test]
    fn access_token_roundtrips() {
        let f = fixture();
        let identity = ada();
        let token = f.issuer.generate_access_token(&identity).unwrap();

        let claims = f.verifier.verify_access_token(&token).unwrap();
        assert_eq!(claims.identity(), identity);
        assert_eq!(claims.iss, f.config.issuer);
        assert_eq!(claims.aud, f.config.audience);
        assert_eq!(claims.exp - claims.iat, f.config.access_ttl_secs());
    }

    #[test]
    fn access_payload_has_no_secret_material() {
        let f = fixture();
        let token = f.issuer.generate_access_token(&ada()).unwrap();
        let payload = token.split('.').nth(1).unwrap();
        assert!(!payload.is_empty());
        assert!(!token.contains("access-secret"));
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn expired_access_token_is_reported_as_expired() {
        let f = fixture();
        let token = f.issuer.generate_access_token(&ada()).unwrap();

        f.clock.advance(Duration::seconds(f.config.access_ttl_secs()));
        assert_eq!(f.verifier.verify_access_token(&token), Err(AuthError::TokenExpired));
    }

    #[test]
    fn leeway_extends_expiry() {
        let config = test_config().with_leeway(std::time::Duration::from_secs(30));
        let f = fixture_with(config);
        let token = f.issuer.generate_access_token(&ada()).unwrap();

        f.clock.advance(Duration::seconds(f.config.access_ttl_secs() + 10));
        assert!(f.verifier.verify_access_token(&token).is_ok());

        f.clock.advance(Duration::seconds(30));
        assert_eq!(f.verifier.verify_access_token(&token), Err(AuthError::TokenExpired));
    }

    #[test]
    fn wrong_secret_is_invalid_signature() {
        let f = fixture();
        let identity = ada();
        let now = f.clock.now().timestamp();
        let payload = json!({
            "sub": identity.id.to_string(),
            "email": identity.email,
            "role": "admin",
            "name": identity.name,
            "type": "access",
            "iat": now,
            "exp": now + 60,
            "iss": f.config.issuer,
            "aud": f.config.audience,
        });
        let token = forge(b"some-other-secret-some-other-secret!!", Algorithm::HS256, &payload);
        assert_eq!(f.verifier.verify_access_token(&token), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn other_hmac_algorithms_are_rejected() {
        let f = fixture();
        let identity = ada();
        let now = f.clock.now().timestamp();
        let payload = json!({
            "sub": identity.id.to_string(),
            "email": identity.email,
            "role": "user",
            "name": identity.name,
            "type": "access",
            "iat": now,
            "exp": now + 60,
            "iss": f.config.issuer,
            "aud": f.config.audience,
        });
        let token = forge(f.config.access_secret.expose(), Algorithm::HS512, &payload);
        assert_eq!(f.verifier.verify_access_token(&token), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn unsigned_none_token_is_rejected() {
        let f = fixture();
        let genuine = f.issuer.generate_access_token(&ada()).unwrap();
        let payload = genuine.split('.').nth(1).unwrap();
        // {"alg":"none","typ":"JWT"}
        let token = format!("eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.{payload}.");

        assert_eq!(f.verifier.verify_access_token(&token), Err(AuthError::MalformedToken));
    }

    #[test]
    fn garbage_is_malformed() {
        let f = fixture();
        assert_eq!(f.verifier.verify_access_token("not-a-jwt"), Err(AuthError::MalformedToken));
        assert_eq!(f.verifier.verify_access_token("a.b.c"), Err(AuthError::MalformedToken));
    }

    #[test]
    fn foreign_issuer_or_audience_is_invalid_claims() {
        let f = fixture();
        let mut other = test_config();
        other.issuer = "someone-else".to_string();
        let foreign = fixture_with(other);
        let token = foreign.issuer.generate_access_token(&ada()).unwrap();
        assert_eq!(f.verifier.verify_access_token(&token), Err(AuthError::InvalidClaims));

        let mut other = test_config();
        other.audience = "another-app".to_string();
        let foreign = fixture_with(other);
        let token = foreign.issuer.generate_access_token(&ada()).unwrap();
        assert_eq!(f.verifier.verify_access_token(&token), Err(AuthError::InvalidClaims));
    }

    #[tokio::test]
    async fn refresh_token_presented_as_access_is_wrong_type() {
        let f = fixture();
        let refresh = f.issuer.generate_refresh_token(&ada()).await.unwrap();
        assert_eq!(f.verifier.verify_access_token(&refresh.token), Err(AuthError::WrongTokenType));
    }

    #[tokio::test]
    async fn access_token_presented_as_refresh_is_wrong_type() {
        let f = fixture();
        let access = f.issuer.generate_access_token(&ada()).unwrap();
        assert_eq!(
            f.verifier.verify_refresh_token(&access).await,
            Err(AuthError::WrongTokenType)
        );
    }

    #[test]
    fn mismatched_type_field_under_right_secret_is_wrong_type() {
        let f = fixture();
        let now = f.clock.now().timestamp();
        let payload = json!({
            "sub": UserId::new().to_string(),
            "jti": TokenId::new().to_string(),
            "type": "refresh",
            "iat": now,
            "exp": now + 60,
            "iss": f.config.issuer,
            "aud": f.config.audience,
        });
        let token = forge(f.config.access_secret.expose(), Algorithm::HS256, &payload);
        assert_eq!(f.verifier.verify_access_token(&token), Err(AuthError::WrongTokenType));
    }

    #[test]
    fn extra_payload_fields_are_malformed() {
        let f = fixture();
        let identity = ada();
        let now = f.clock.now().timestamp();
        let payload = json!({
            "sub": identity.id.to_string(),
            "email": identity.email,
            "role": "user",
            "name": identity.name,
            "type": "access",
            "iat": now,
            "exp": now + 60,
            "iss": f.config.issuer,
            "aud": f.config.audience,
            "is_admin": true,
        });
        let token = forge(f.config.access_secret.expose(), Algorithm::HS256, &payload);
        assert_eq!(f.verifier.verify_access_token(&token), Err(AuthError::MalformedToken));
    }

    #[tokio::test]
    async fn refresh_token_verifies_against_registry() {
        let f = fixture();
        let identity = ada();
        let issued = f.issuer.generate_refresh_token(&identity).await.unwrap();

        let claims = f.verifier.verify_refresh_token(&issued.token).await.unwrap();
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.sub, identity.id);
    }

    #[tokio::test]
    async fn revoked_refresh_token_fails_before_expiry() {
        let f = fixture();
        let issued = f.issuer.generate_refresh_token(&ada()).await.unwrap();
        f.registry.revoke(issued.jti).await.unwrap();

        assert_eq!(f.verifier.verify_refresh_token(&issued.token).await, Err(AuthError::Revoked));
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_reuse() {
        let f = fixture();
        let identity = ada();
        let issued = f.issuer.generate_refresh_token(&identity).await.unwrap();
        f.issuer.rotate_refresh_token(issued.jti, &identity).await.unwrap();

        assert_eq!(
            f.verifier.verify_refresh_token(&issued.token).await,
            Err(AuthError::ReuseDetected)
        );
    }

    #[tokio::test]
    async fn unregistered_refresh_token_is_unknown() {
        let f = fixture();
        let now = f.clock.now().timestamp();
        let payload = json!({
            "sub": UserId::new().to_string(),
            "jti": TokenId::new().to_string(),
            "type": "refresh",
            "iat": now,
            "exp": now + 600,
            "iss": f.config.issuer,
            "aud": f.config.audience,
        });
        let token = forge(f.config.refresh_secret.expose(), Algorithm::HS256, &payload);
        assert_eq!(f.verifier.verify_refresh_token(&token).await, Err(AuthError::UnknownToken));
    }

    #[tokio::test]
    async fn logout_decode_tolerates_expiry() {
        let f = fixture();
        let issued = f.issuer.generate_refresh_token(&ada()).await.unwrap();
        f.clock.advance(Duration::seconds(f.config.refresh_ttl_secs() + 1));

        assert_eq!(f.verifier.verify_refresh_token(&issued.token).await, Err(AuthError::TokenExpired));
        assert_eq!(f.verifier.decode_refresh_for_logout(&issued.token).unwrap().jti, issued.jti);
    }

    #[test]
    fn verifiers_with_rotated_secret_reject_old_tokens() {
        let f = fixture();
        let token = f.issuer.generate_access_token(&ada()).unwrap();

        let mut rotated = test_config();
        rotated.access_secret = Secret::new(b"a-brand-new-access-secret-0123456789".to_vec());
        let g = fixture_with(rotated);
        assert_eq!(g.verifier.verify_access_token(&token), Err(AuthError::InvalidSignature));
    }

    fn identity_strategy() -> impl Strategy<Value = Identity> {
        (
            "[a-z]{1,12}@[a-z]{1,8}\\.(com|org|io)",
            prop_oneof![Just("user"), Just("admin"), Just("editor")],
            "[A-Za-z ]{0,24}",
        )
            .prop_map(|(email, role, name)| Identity::new(UserId::new(), email, Role::new(role), name))
    }

    proptest! {
        #[test]
        fn any_identity_roundtrips(identity in identity_strategy()) {
            let f = fixture();
            let token = f.issuer.generate_access_token(&identity).unwrap();
            let claims = f.verifier.verify_access_token(&token).unwrap();
            prop_assert_eq!(claims.sub, identity.id);
            prop_assert_eq!(claims.email, identity.email);
            prop_assert_eq!(claims.role, identity.role);
        }
    }
}
