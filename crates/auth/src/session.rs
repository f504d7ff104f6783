//! Session lifecycle: login, refresh, logout.
//!
//! This is the entry point for everything that creates, renews or ends a
//! session. Protected requests never come through here; they only need the
//! [`TokenVerifier`] (see [`crate::pipeline`]).

use std::sync::Arc;

use tracing::instrument;

use sessiongate_core::{Clock, TokenId, UserId};

use crate::config::{ReusePolicy, TokenConfig};
use crate::credentials::{CredentialStore, PasswordVerifier};
use crate::identity::normalize_email;
use crate::issuer::{TokenIssuer, TokenPair};
use crate::registry::{purge_cutoff, DeadlineRegistry, RefreshTokenRegistry};
use crate::{AuthError, TokenVerifier};

pub struct SessionController {
    issuer: TokenIssuer,
    verifier: Arc<TokenVerifier>,
    registry: Arc<dyn RefreshTokenRegistry>,
    credentials: Arc<dyn CredentialStore>,
    passwords: Arc<dyn PasswordVerifier>,
    clock: Arc<dyn Clock>,
    reuse_policy: ReusePolicy,
    leeway: std::time::Duration,
}

impl SessionController {
    /// Every registry call made through the controller (and its issuer and
    /// verifier) is bounded by `config.registry_timeout`.
    pub fn new(
        config: &TokenConfig,
        registry: Arc<dyn RefreshTokenRegistry>,
        credentials: Arc<dyn CredentialStore>,
        passwords: Arc<dyn PasswordVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry: Arc<dyn RefreshTokenRegistry> =
            Arc::new(DeadlineRegistry::new(registry, config.registry_timeout));

        Self {
            issuer: TokenIssuer::new(config, registry.clone(), clock.clone()),
            verifier: Arc::new(TokenVerifier::new(config, registry.clone(), clock.clone())),
            registry,
            credentials,
            passwords,
            clock,
            reuse_policy: config.reuse_policy,
            leeway: config.leeway,
        }
    }

    /// The verifier used for bearer authentication of protected requests.
    pub fn verifier(&self) -> Arc<TokenVerifier> {
        self.verifier.clone()
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Exchange email and password for a token pair.
    ///
    /// Unknown email and wrong password are indistinguishable: same error, and
    /// exactly one password verification either way.
    #[instrument(skip_all, err(Display))]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let stored = self.credentials.find_by_email(&normalize_email(email)).await?;

        let (identity, hash) = match stored {
            Some(credential) => (Some(credential.identity), credential.password_hash),
            None => (None, self.passwords.dummy_hash().to_string()),
        };

        let passwords = self.passwords.clone();
        let plain = password.to_string();
        let matches = tokio::task::spawn_blocking(move || passwords.verify_password(&plain, &hash))
            .await
            .map_err(|e| AuthError::internal(format!("password verification task failed: {e}")))?;

        match identity {
            Some(identity) if matches => {
                let pair = self.issuer.generate_token_pair(&identity).await?;
                tracing::info!(subject = %identity.id, "login succeeded");
                Ok(pair)
            }
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    /// Rotate a refresh token into a new token pair.
    ///
    /// The identity is reloaded from the credential store so role or profile
    /// changes show up in the new access token.
    #[instrument(skip_all, err(Display))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = match self.verifier.verify_refresh_token(refresh_token).await {
            Ok(claims) => claims,
            Err(AuthError::ReuseDetected) => {
                // The signature already checked out; only the subject is needed.
                if let Ok(claims) = self.verifier.decode_refresh_for_logout(refresh_token) {
                    self.on_reuse(claims.sub, claims.jti).await;
                }
                return Err(AuthError::ReuseDetected);
            }
            Err(err) => return Err(err),
        };

        let Some(identity) = self.credentials.find_by_id(claims.sub).await? else {
            tracing::warn!(subject = %claims.sub, jti = %claims.jti, "refresh for a user that no longer exists");
            self.registry.revoke(claims.jti).await?;
            return Err(AuthError::Revoked);
        };

        // Sign the access token before consuming the old refresh token.
        let access_token = self.issuer.generate_access_token(&identity)?;

        let refresh = match self.issuer.rotate_refresh_token(claims.jti, &identity).await {
            Ok(refresh) => refresh,
            Err(AuthError::ReuseDetected) => {
                self.on_reuse(claims.sub, claims.jti).await;
                return Err(AuthError::ReuseDetected);
            }
            Err(err) => return Err(err),
        };

        tracing::info!(subject = %identity.id, new_jti = %refresh.jti, "session refreshed");
        Ok(self.issuer.pair(access_token, refresh))
    }

    /// End a session. Always succeeds from the caller's point of view.
    ///
    /// Expired tokens are still accepted here so a client can log out after
    /// the refresh TTL; tokens that fail the signature check are ignored.
    #[instrument(skip_all)]
    pub async fn logout(&self, refresh_token: &str) {
        let claims = match self.verifier.decode_refresh_for_logout(refresh_token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::debug!(error = %err, "logout with an unusable token ignored");
                return;
            }
        };

        match self.registry.revoke(claims.jti).await {
            Ok(()) => tracing::info!(subject = %claims.sub, jti = %claims.jti, "logged out"),
            Err(err) => tracing::warn!(jti = %claims.jti, error = %err, "logout revocation failed"),
        }
    }

    /// Revoke every outstanding refresh token of `subject`.
    #[instrument(skip_all, fields(subject = %subject), err(Display))]
    pub async fn revoke_all_sessions(&self, subject: UserId) -> Result<u64, AuthError> {
        let revoked = self.registry.revoke_all_for_subject(subject).await?;
        tracing::info!(revoked, "sessions revoked");
        Ok(revoked)
    }

    /// Drop registry entries that are past their expiry plus leeway.
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        let cutoff = purge_cutoff(self.clock.now(), self.leeway);
        let purged = self.registry.purge_expired(cutoff).await?;
        if purged > 0 {
            tracing::debug!(purged, "expired refresh tokens purged");
        }
        Ok(purged)
    }

    async fn on_reuse(&self, subject: UserId, jti: TokenId) {
        tracing::warn!(subject = %subject, jti = %jti, policy = ?self.reuse_policy, "refresh token reuse detected");

        match self.reuse_policy {
            ReusePolicy::RevokeTokenOnly => {}
            ReusePolicy::RevokeAllForSubject => match self.registry.revoke_all_for_subject(subject).await {
                Ok(n) => tracing::warn!(subject = %subject, revoked = n, "revoked all sessions after reuse"),
                Err(err) => tracing::error!(subject = %subject, error = %err, "failed to revoke sessions after reuse"),
            },
        }
    }
}

impl core::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionController")
            .field("issuer", &self.issuer)
            .field("reuse_policy", &self.reuse_policy)
            .finish_non_exhaustive()
    }
}
