//! Credential store and password verifier boundaries.
//!
//! Both are owned by the host application; the session controller only calls
//! them. Hashing algorithm details live behind [`PasswordVerifier`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use sessiongate_core::UserId;

use crate::identity::normalize_email;
use crate::Identity;

/// An identity together with its stored password hash.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub identity: Identity,
    pub password_hash: String,
}

impl core::fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoredCredential")
            .field("identity", &self.identity)
            .field("password_hash", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialStoreError {
    #[error("credential store error: {0}")]
    Backend(String),
}

impl From<CredentialStoreError> for crate::AuthError {
    fn from(err: CredentialStoreError) -> Self {
        crate::AuthError::internal(err.to_string())
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredCredential>, CredentialStoreError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<Identity>, CredentialStoreError>;
}

#[async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredCredential>, CredentialStoreError> {
        (**self).find_by_email(email).await
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<Identity>, CredentialStoreError> {
        (**self).find_by_id(id).await
    }
}

/// Compares a plaintext password with a stored hash.
///
/// Implementations are CPU-bound; callers run them on the blocking pool.
pub trait PasswordVerifier: Send + Sync {
    fn verify_password(&self, plain: &str, hash: &str) -> bool;

    /// A well-formed hash that matches no real password. Login verifies against
    /// it when the email is unknown so both failure paths cost the same.
    fn dummy_hash(&self) -> &str;
}

/// In-memory credential store (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    by_email: RwLock<HashMap<String, StoredCredential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the credential for `identity.email`.
    pub fn insert(&self, identity: Identity, password_hash: impl Into<String>) {
        let key = normalize_email(&identity.email);
        let mut by_email = self.by_email.write().unwrap_or_else(|p| p.into_inner());
        by_email.insert(
            key,
            StoredCredential {
                identity,
                password_hash: password_hash.into(),
            },
        );
    }

    pub fn remove(&self, id: UserId) {
        let mut by_email = self.by_email.write().unwrap_or_else(|p| p.into_inner());
        by_email.retain(|_, c| c.identity.id != id);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredCredential>, CredentialStoreError> {
        let by_email = self
            .by_email
            .read()
            .map_err(|_| CredentialStoreError::Backend("lock poisoned".to_string()))?;
        Ok(by_email.get(&normalize_email(email)).cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<Identity>, CredentialStoreError> {
        let by_email = self
            .by_email
            .read()
            .map_err(|_| CredentialStoreError::Backend("lock poisoned".to_string()))?;
        Ok(by_email
            .values()
            .find(|c| c.identity.id == id)
            .map(|c| c.identity.clone()))
    }
}
