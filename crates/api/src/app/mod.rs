//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: builds the session controller and its backends from config
//! - `routes/`: HTTP handlers (one file per area)
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: `AuthError` to HTTP mapping and JSON error bodies

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;

use sessiongate_auth::{AccessRule, CredentialStore, Role, SessionController};

use crate::{authz, middleware};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionController>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionController>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self { sessions, credentials }
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(state: AppState) -> Router {
    let auth_state = middleware::AuthState {
        verifier: state.sessions.verifier(),
    };

    // Role-gated routes; authentication wraps them below.
    let admin = Router::new()
        .route("/admin/sessions/:user_id", delete(routes::admin::revoke_sessions))
        .route_layer(from_fn_with_state(
            AccessRule::Role(Role::admin()),
            authz::require_access,
        ));

    let protected = Router::new()
        .route("/whoami", get(routes::system::whoami))
        .route("/users/:id", get(routes::users::get_user))
        .merge(admin)
        .route_layer(from_fn_with_state(auth_state, middleware::auth_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/login", post(routes::session::login))
        .route("/refresh", post(routes::session::refresh))
        .route("/logout", post(routes::session::logout))
        .merge(protected)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(from_fn(middleware::log_requests)))
}
