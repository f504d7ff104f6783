//! API-side role guard.
//!
//! Runs after [`crate::middleware::auth_middleware`] and checks the request's
//! identity against an [`AccessRule`]. Ownership checks need the resource id,
//! so they happen in the handlers instead.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use sessiongate_auth::{AccessRule, AuthError};

use crate::app::errors::ApiError;
use crate::context::IdentityContext;

/// Use with `axum::middleware::from_fn_with_state(rule, require_access)`.
pub async fn require_access(
    State(rule): State<AccessRule>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = req
        .extensions()
        .get::<IdentityContext>()
        .ok_or(AuthError::MissingToken)?;

    if let Err(err) = rule.check(ctx.identity()) {
        tracing::info!(subject = %ctx.user_id(), role = %ctx.role(), error = %err, "access denied");
        return Err(err.into());
    }

    Ok(next.run(req).await)
}
