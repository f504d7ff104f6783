use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use sessiongate_auth::AuthError;

/// HTTP status of an authentication/authorization failure.
///
/// Expired credentials and missing credentials are 401 so clients know to
/// refresh or log in; a token that is present but unacceptable is 403.
pub fn auth_error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::MissingToken
        | AuthError::MalformedHeader
        | AuthError::TokenExpired
        | AuthError::Revoked
        | AuthError::UnknownToken
        | AuthError::ReuseDetected
        | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::MalformedToken
        | AuthError::InvalidSignature
        | AuthError::InvalidClaims
        | AuthError::WrongTokenType
        | AuthError::InsufficientRole { .. }
        | AuthError::NotOwner => StatusCode::FORBIDDEN,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error response of the refresh endpoint.
///
/// A refresh token that fails signature or format checks cannot be recovered
/// from, so it is reported as 401 (log in again) rather than 403.
pub fn refresh_error_to_response(err: AuthError) -> Response {
    if err.is_token_rejection() && auth_error_status(&err) == StatusCode::FORBIDDEN {
        return json_error(StatusCode::UNAUTHORIZED, err.code(), err.public_message());
    }
    ApiError(err).into_response()
}

pub fn auth_error_to_response(err: AuthError) -> Response {
    if let AuthError::Internal(detail) = &err {
        tracing::error!(detail = %detail, "internal error while handling request");
    }
    json_error(auth_error_status(&err), err.code(), err.public_message())
}

/// Handler/middleware error carrying an [`AuthError`].
#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        auth_error_to_response(self.0)
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

pub fn not_found(message: impl Into<String>) -> Response {
    json_error(StatusCode::NOT_FOUND, "not_found", message)
}
