use axum::{
    extract::{Extension, Path, State},
    response::{IntoResponse, Response},
    Json,
};

use sessiongate_auth::{require_owner_or_admin, AuthError};
use sessiongate_core::UserId;

use crate::app::dto::IdentityResponse;
use crate::app::errors::{bad_request, not_found, ApiError};
use crate::app::AppState;
use crate::context::IdentityContext;

/// Profile of a user: visible to that user and to admins.
pub async fn get_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> Response {
    let Ok(user_id) = id.parse::<UserId>() else {
        return bad_request("invalid user id");
    };

    if let Err(err) = require_owner_or_admin(ctx.identity(), user_id) {
        return ApiError(err).into_response();
    }

    match state.credentials.find_by_id(user_id).await {
        Ok(Some(identity)) => Json(IdentityResponse::from(&identity)).into_response(),
        Ok(None) => not_found("user not found"),
        Err(err) => ApiError(AuthError::from(err)).into_response(),
    }
}
