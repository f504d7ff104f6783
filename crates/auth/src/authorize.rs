//! Role and ownership checks on an already-authenticated identity.
//!
//! - No IO
//! - No panics
//! - Exact role matching; there is no role hierarchy
//!
//! Denials name the required and actual role. That is safe here because the
//! caller has already proven who they are.

use sessiongate_core::UserId;

use crate::{AuthError, Identity, Role};

/// Permit only identities whose role is exactly `required`.
pub fn require_role(identity: &Identity, required: &Role) -> Result<(), AuthError> {
    if identity.role == *required {
        Ok(())
    } else {
        Err(AuthError::insufficient_role(required, &identity.role))
    }
}

/// Permit identities whose role is exactly one of `allowed`.
pub fn require_any_role(identity: &Identity, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.iter().any(|r| *r == identity.role) {
        return Ok(());
    }

    let required = allowed
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(" | ");
    Err(AuthError::InsufficientRole {
        required,
        actual: identity.role.as_str().to_string(),
    })
}

/// Permit the owner of a resource, or any admin.
pub fn require_owner_or_admin(identity: &Identity, owner_id: UserId) -> Result<(), AuthError> {
    if identity.id == owner_id || identity.role.is_admin() {
        Ok(())
    } else {
        Err(AuthError::NotOwner)
    }
}

/// Declarative form of the checks above, for routing layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRule {
    Role(Role),
    AnyRole(Vec<Role>),
}

impl AccessRule {
    pub fn check(&self, identity: &Identity) -> Result<(), AuthError> {
        match self {
            AccessRule::Role(role) => require_role(identity, role),
            AccessRule::AnyRole(roles) => require_any_role(identity, roles),
        }
    }
}
