use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};

use crate::app::dto::{LoginRequest, LogoutRequest, MessageResponse, RefreshRequest};
use crate::app::errors::{bad_request, refresh_error_to_response, ApiError};
use crate::app::AppState;

pub async fn login(State(state): State<AppState>, body: Result<Json<LoginRequest>, JsonRejection>) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    match state.sessions.login(&req.email, &req.password).await {
        Ok(pair) => Json(pair).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

pub async fn refresh(State(state): State<AppState>, body: Result<Json<RefreshRequest>, JsonRejection>) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    match state.sessions.refresh(&req.refresh_token).await {
        Ok(pair) => Json(pair).into_response(),
        Err(err) => refresh_error_to_response(err),
    }
}

/// Always 200: the response never reveals whether the token was valid.
pub async fn logout(
    State(state): State<AppState>,
    body: Result<Json<LogoutRequest>, JsonRejection>,
) -> Json<MessageResponse> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    if let Some(token) = req.refresh_token.as_deref() {
        state.sessions.logout(token).await;
    }

    Json(MessageResponse { message: "logged out" })
}
