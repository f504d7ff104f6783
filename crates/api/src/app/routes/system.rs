use axum::{extract::Extension, http::StatusCode, Json};

use crate::app::dto::IdentityResponse;
use crate::context::IdentityContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(ctx): Extension<IdentityContext>) -> Json<IdentityResponse> {
    Json(IdentityResponse::from(ctx.identity()))
}
