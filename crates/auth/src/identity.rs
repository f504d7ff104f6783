use serde::{Deserialize, Serialize};

use sessiongate_core::UserId;

use crate::Role;

/// An authenticated (or authenticatable) identity.
///
/// The credential store owns identities. Access tokens carry a copy of these
/// fields so protected routes need no lookup, but the store stays the source
/// of truth: refresh re-reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub name: String,
}

impl Identity {
    pub fn new(id: UserId, email: impl Into<String>, role: Role, name: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            role,
            name: name.into(),
        }
    }
}

/// Normalize an email for lookups (trimmed, lowercase).
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
