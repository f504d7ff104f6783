use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use sessiongate_core::{TokenId, UserId};

use crate::registry::{RefreshTokenRegistry, RegistryEntry, RegistryError};

/// In-memory refresh token registry.
///
/// Intended for tests/dev: state is lost on restart and not shared between
/// processes. Every mutation runs inside one write-lock critical section and
/// the lock is never held across an `.await`.
#[derive(Debug, Default)]
pub struct InMemoryRefreshRegistry {
    entries: RwLock<HashMap<TokenId, RegistryEntry>>,
}

impl InMemoryRefreshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> RegistryError {
        RegistryError::backend("lock poisoned")
    }
}

#[async_trait]
impl RefreshTokenRegistry for InMemoryRefreshRegistry {
    async fn create(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        if entries.contains_key(&entry.jti) {
            return Err(RegistryError::Duplicate(entry.jti));
        }
        entries.insert(entry.jti, entry);
        Ok(())
    }

    async fn find(&self, jti: TokenId) -> Result<Option<RegistryEntry>, RegistryError> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.get(&jti).cloned())
    }

    async fn revoke(&self, jti: TokenId) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        if let Some(entry) = entries.get_mut(&jti) {
            entry.revoked = true;
        }
        Ok(())
    }

    async fn rotate(
        &self,
        old_jti: TokenId,
        subject: UserId,
        successor: RegistryEntry,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;

        if entries.contains_key(&successor.jti) {
            return Err(RegistryError::Duplicate(successor.jti));
        }

        let old = match entries.get_mut(&old_jti) {
            Some(old) if !old.revoked && old.subject == subject => old,
            _ => return Err(RegistryError::ReuseDetected(old_jti)),
        };

        old.revoked = true;
        old.replaced_by = Some(successor.jti);
        entries.insert(successor.jti, successor);
        Ok(())
    }

    async fn revoke_all_for_subject(&self, subject: UserId) -> Result<u64, RegistryError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        let mut revoked = 0;
        for entry in entries.values_mut().filter(|e| e.subject == subject && !e.revoked) {
            entry.revoked = true;
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        Ok((before - entries.len()) as u64)
    }
}
