//! Bootstrap users for the in-memory credential store.
//!
//! `AUTH_SEED_USERS` holds a JSON array:
//! `[{"email":"a@b.c","password":"...","role":"admin","name":"A"}]`.
//! `id` is optional; a fresh one is generated when absent.

use serde::Deserialize;

use sessiongate_auth::{ConfigError, Identity, InMemoryCredentialStore, Role};
use sessiongate_core::UserId;

use super::{Argon2PasswordVerifier, PasswordHashError};

#[derive(Clone, Deserialize)]
pub struct SeedUser {
    #[serde(default)]
    pub id: Option<UserId>,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
    pub name: String,
}

fn default_role() -> Role {
    Role::user()
}

impl core::fmt::Debug for SeedUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SeedUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub fn parse_seed_users(json: &str) -> Result<Vec<SeedUser>, ConfigError> {
    let users: Vec<SeedUser> = serde_json::from_str(json).map_err(|e| ConfigError::Invalid {
        field: "AUTH_SEED_USERS",
        reason: e.to_string(),
    })?;

    if let Some(user) = users.iter().find(|u| u.email.trim().is_empty() || u.password.is_empty()) {
        return Err(ConfigError::Invalid {
            field: "AUTH_SEED_USERS",
            reason: format!("user '{}' needs a non-empty email and password", user.name),
        });
    }

    Ok(users)
}

/// Hash and insert every seed user; returns the identities created.
pub fn seed_credentials(
    store: &InMemoryCredentialStore,
    hasher: &Argon2PasswordVerifier,
    users: &[SeedUser],
) -> Result<Vec<Identity>, PasswordHashError> {
    let mut seeded = Vec::with_capacity(users.len());
    for user in users {
        let identity = Identity::new(
            user.id.unwrap_or_default(),
            user.email.trim(),
            user.role.clone(),
            user.name.clone(),
        );
        let hash = hasher.hash_password(&user.password)?;
        store.insert(identity.clone(), hash);
        tracing::info!(subject = %identity.id, role = %identity.role, "seeded user");
        seeded.push(identity);
    }
    Ok(seeded)
}
