use sessiongate_auth::{Identity, Role};
use sessiongate_core::UserId;

/// Authenticated identity of a request.
///
/// Inserted into request extensions by the auth middleware; handlers behind it
/// can rely on it being present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    identity: Identity,
}

impl IdentityContext {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn user_id(&self) -> UserId {
        self.identity.id
    }

    pub fn role(&self) -> &Role {
        &self.identity.role
    }
}
