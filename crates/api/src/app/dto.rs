use serde::{Deserialize, Serialize};

use sessiongate_auth::Identity;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout accepts anything; a missing token is simply nothing to revoke.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    pub id: String,
    pub email: String,
    pub role: String,
    pub name: String,
}

impl From<&Identity> for IdentityResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.to_string(),
            email: identity.email.clone(),
            role: identity.role.as_str().to_string(),
            name: identity.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RevokedSessionsResponse {
    pub user_id: String,
    pub revoked: u64,
}
