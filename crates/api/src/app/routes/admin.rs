use axum::{
    extract::{Extension, Path, State},
    response::{IntoResponse, Response},
    Json,
};

use sessiongate_core::UserId;

use crate::app::dto::RevokedSessionsResponse;
use crate::app::errors::{bad_request, ApiError};
use crate::app::AppState;
use crate::context::IdentityContext;

/// Revoke every refresh token of a user (forced logout everywhere).
pub async fn revoke_sessions(
    State(state): State<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    Path(user_id): Path<String>,
) -> Response {
    let Ok(user_id) = user_id.parse::<UserId>() else {
        return bad_request("invalid user id");
    };

    match state.sessions.revoke_all_sessions(user_id).await {
        Ok(revoked) => {
            tracing::info!(admin = %ctx.user_id(), subject = %user_id, revoked, "admin revoked sessions");
            Json(RevokedSessionsResponse {
                user_id: user_id.to_string(),
                revoked,
            })
            .into_response()
        }
        Err(err) => ApiError(err).into_response(),
    }
}
