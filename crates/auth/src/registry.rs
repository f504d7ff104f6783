//! Refresh token registry boundary.
//!
//! A refresh token's signature says who minted it; the registry says whether it
//! may still be used. The registry owns one [`RegistryEntry`] per `jti` and is
//! the only shared mutable state in the session subsystem.
//!
//! ## Rotation semantics
//!
//! `rotate(old, subject, successor)` is a compare-and-swap on `old.revoked`:
//! - `old` absent, already revoked, or owned by a different subject:
//!   [`RegistryError::ReuseDetected`], nothing changes.
//! - otherwise `old` becomes `{revoked: true, replaced_by: successor.jti}` and
//!   `successor` is created, as one atomic step.
//!
//! Two concurrent rotations of the same `jti` therefore have exactly one
//! winner; the loser observes `ReuseDetected`, never a silent no-op.
//!
//! ## Implementations
//!
//! - [`crate::InMemoryRefreshRegistry`] (tests/dev, single process)
//! - `sessiongate-infra::refresh_registry::PostgresRefreshRegistry` (durable,
//!   shared across instances)
//!
//! Wrap either in [`DeadlineRegistry`] so a slow backend fails closed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sessiongate_core::{TokenId, UserId};

/// Durable lifecycle record of one refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub jti: TokenId,
    pub subject: UserId,
    pub created_at: DateTime<Utc>,
    /// Mirrors the token's `exp`; entries past it can be purged.
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub replaced_by: Option<TokenId>,
}

impl RegistryEntry {
    /// A fresh, usable entry.
    pub fn new(
        jti: TokenId,
        subject: UserId,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            jti,
            subject,
            created_at,
            expires_at,
            revoked: false,
            replaced_by: None,
        }
    }

    /// Revoked because it was rotated (as opposed to logout/admin revocation).
    pub fn was_rotated(&self) -> bool {
        self.revoked && self.replaced_by.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("refresh token {0} is already registered")]
    Duplicate(TokenId),

    #[error("refresh token {0} was already used or revoked")]
    ReuseDetected(TokenId),

    #[error("registry operation '{0}' timed out")]
    Timeout(&'static str),

    #[error("registry backend error: {0}")]
    Backend(String),
}

impl RegistryError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<RegistryError> for crate::AuthError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ReuseDetected(_) => crate::AuthError::ReuseDetected,
            other => crate::AuthError::internal(other.to_string()),
        }
    }
}

/// Cutoff to pass to [`RefreshTokenRegistry::purge_expired`].
///
/// The verifier still accepts a token for `leeway` after its `exp`, so its
/// entry must outlive that window for replays to be recognised as reuse.
pub fn purge_cutoff(now: DateTime<Utc>, leeway: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(leeway)
        .ok()
        .and_then(|leeway| now.checked_sub_signed(leeway))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Storage for refresh token lifecycle records.
///
/// Implementations must:
/// - make `rotate` atomic and first-committer-wins per `jti`
/// - make `revoke` idempotent (revoking an unknown or revoked `jti` succeeds)
/// - never hold an exclusive lock across an `.await` on foreign I/O
#[async_trait]
pub trait RefreshTokenRegistry: Send + Sync {
    /// Persist a new entry. Fails with `Duplicate` if the `jti` exists.
    async fn create(&self, entry: RegistryEntry) -> Result<(), RegistryError>;

    async fn find(&self, jti: TokenId) -> Result<Option<RegistryEntry>, RegistryError>;

    /// Mark an entry revoked. Idempotent.
    async fn revoke(&self, jti: TokenId) -> Result<(), RegistryError>;

    /// Single-use rotation; see the module docs.
    async fn rotate(
        &self,
        old_jti: TokenId,
        subject: UserId,
        successor: RegistryEntry,
    ) -> Result<(), RegistryError>;

    /// Revoke every active entry of `subject`; returns how many changed.
    async fn revoke_all_for_subject(&self, subject: UserId) -> Result<u64, RegistryError>;

    /// Remove entries whose `expires_at` is not after `now`; returns how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RegistryError>;
}

#[async_trait]
impl<R> RefreshTokenRegistry for Arc<R>
where
    R: RefreshTokenRegistry + ?Sized,
{
    async fn create(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
        (**self).create(entry).await
    }

    async fn find(&self, jti: TokenId) -> Result<Option<RegistryEntry>, RegistryError> {
        (**self).find(jti).await
    }

    async fn revoke(&self, jti: TokenId) -> Result<(), RegistryError> {
        (**self).revoke(jti).await
    }

    async fn rotate(
        &self,
        old_jti: TokenId,
        subject: UserId,
        successor: RegistryEntry,
    ) -> Result<(), RegistryError> {
        (**self).rotate(old_jti, subject, successor).await
    }

    async fn revoke_all_for_subject(&self, subject: UserId) -> Result<u64, RegistryError> {
        (**self).revoke_all_for_subject(subject).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        (**self).purge_expired(now).await
    }
}

/// Bounds every registry call by a deadline.
///
/// An elapsed deadline is reported as [`RegistryError::Timeout`]; callers treat
/// it like any other failure. The outcome of a timed-out `rotate` is unknown:
/// the backend may already have committed it. Either way the caller gets an
/// error and no successor is handed out, so the worst case is a revoked old
/// entry and a forced re-login.
#[derive(Debug, Clone)]
pub struct DeadlineRegistry<R> {
    inner: R,
    timeout: Duration,
}

impl<R> DeadlineRegistry<R> {
    pub fn new(inner: R, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, RegistryError>
    where
        F: std::future::Future<Output = Result<T, RegistryError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation = op, timeout_ms = self.timeout.as_millis() as u64, "registry call timed out");
                Err(RegistryError::Timeout(op))
            }
        }
    }
}

#[async_trait]
impl<R> RefreshTokenRegistry for DeadlineRegistry<R>
where
    R: RefreshTokenRegistry,
{
    async fn create(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
        self.bounded("create", self.inner.create(entry)).await
    }

    async fn find(&self, jti: TokenId) -> Result<Option<RegistryEntry>, RegistryError> {
        self.bounded("find", self.inner.find(jti)).await
    }

    async fn revoke(&self, jti: TokenId) -> Result<(), RegistryError> {
        self.bounded("revoke", self.inner.revoke(jti)).await
    }

    async fn rotate(
        &self,
        old_jti: TokenId,
        subject: UserId,
        successor: RegistryEntry,
    ) -> Result<(), RegistryError> {
        self.bounded("rotate", self.inner.rotate(old_jti, subject, successor))
            .await
    }

    async fn revoke_all_for_subject(&self, subject: UserId) -> Result<u64, RegistryError> {
        self.bounded("revoke_all_for_subject", self.inner.revoke_all_for_subject(subject))
            .await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        self.bounded("purge_expired", self.inner.purge_expired(now))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Never answers.
    struct StalledRegistry;

    #[async_trait]
    impl RefreshTokenRegistry for StalledRegistry {
        async fn create(&self, _entry: RegistryEntry) -> Result<(), RegistryError> {
            std::future::pending().await
        }

        async fn find(&self, _jti: TokenId) -> Result<Option<RegistryEntry>, RegistryError> {
            std::future::pending().await
        }

        async fn revoke(&self, _jti: TokenId) -> Result<(), RegistryError> {
            std::future::pending().await
        }

        async fn rotate(
            &self,
            _old_jti: TokenId,
            _subject: UserId,
            _successor: RegistryEntry,
        ) -> Result<(), RegistryError> {
            std::future::pending().await
        }

        async fn revoke_all_for_subject(&self, _subject: UserId) -> Result<u64, RegistryError> {
            std::future::pending().await
        }

        async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<u64, RegistryError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn deadline_fails_closed() {
        let registry = DeadlineRegistry::new(StalledRegistry, Duration::from_millis(20));
        let err = registry.find(TokenId::new()).await.unwrap_err();
        assert_eq!(err, RegistryError::Timeout("find"));

        let now = Utc::now();
        let successor = RegistryEntry::new(TokenId::new(), UserId::new(), now, now);
        let err = registry
            .rotate(TokenId::new(), UserId::new(), successor)
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::Timeout("rotate"));
    }

    #[test]
    fn rotated_entries_are_distinguishable_from_revoked_ones() {
        let now = Utc::now();
        let mut entry = RegistryEntry::new(TokenId::new(), UserId::new(), now, now);
        assert!(!entry.was_rotated());

        entry.revoked = true;
        assert!(!entry.was_rotated());

        entry.replaced_by = Some(TokenId::new());
        assert!(entry.was_rotated());
    }

    /// Applies a rotation, then never acknowledges it.
    struct CommitThenStall(crate::InMemoryRefreshRegistry);

    #[async_trait]
    impl RefreshTokenRegistry for CommitThenStall {
        async fn create(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
            self.0.create(entry).await
        }

        async fn find(&self, jti: TokenId) -> Result<Option<RegistryEntry>, RegistryError> {
            self.0.find(jti).await
        }

        async fn revoke(&self, jti: TokenId) -> Result<(), RegistryError> {
            self.0.revoke(jti).await
        }

        async fn rotate(
            &self,
            old_jti: TokenId,
            subject: UserId,
            successor: RegistryEntry,
        ) -> Result<(), RegistryError> {
            self.0.rotate(old_jti, subject, successor).await?;
            std::future::pending().await
        }

        async fn revoke_all_for_subject(&self, subject: UserId) -> Result<u64, RegistryError> {
            self.0.revoke_all_for_subject(subject).await
        }

        async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RegistryError> {
            self.0.purge_expired(now).await
        }
    }

    #[tokio::test]
    async fn rotation_that_commits_before_the_deadline_still_fails_closed() {
        let registry = DeadlineRegistry::new(
            CommitThenStall(crate::InMemoryRefreshRegistry::new()),
            Duration::from_millis(20),
        );
        let subject = UserId::new();
        let now = Utc::now();
        let first = RegistryEntry::new(TokenId::new(), subject, now, now + chrono::Duration::days(1));
        registry.create(first.clone()).await.unwrap();

        let successor = RegistryEntry::new(TokenId::new(), subject, now, now + chrono::Duration::days(1));
        let err = registry.rotate(first.jti, subject, successor).await.unwrap_err();
        assert_eq!(err, RegistryError::Timeout("rotate"));

        // The old entry is gone for good; presenting it again is reuse.
        assert!(registry.find(first.jti).await.unwrap().unwrap().was_rotated());
        let retry = RegistryEntry::new(TokenId::new(), subject, now, now + chrono::Duration::days(1));
        assert_eq!(
            registry.rotate(first.jti, subject, retry).await,
            Err(RegistryError::ReuseDetected(first.jti))
        );
    }

    #[test]
    fn purge_cutoff_trails_now_by_the_leeway() {
        let now = Utc::now();
        assert_eq!(purge_cutoff(now, Duration::ZERO), now);
        assert_eq!(purge_cutoff(now, Duration::from_secs(30)), now - chrono::Duration::seconds(30));
        assert_eq!(purge_cutoff(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
