//! Service wiring: registry backend, password hashing, credential store and
//! session controller, built from configuration.

use std::sync::Arc;

use thiserror::Error;

use sessiongate_auth::{
    ConfigError, CredentialStore, InMemoryCredentialStore, PasswordVerifier, RefreshTokenRegistry,
    RegistryError, SessionController, TokenConfig,
};
use sessiongate_core::{Clock, SystemClock};
use sessiongate_infra::config::ServerConfig;
use sessiongate_infra::credentials::{seed_credentials, Argon2PasswordVerifier, PasswordHashError};
use sessiongate_infra::refresh_registry::InMemoryRefreshRegistry;
#[cfg(feature = "postgres")]
use sessiongate_infra::refresh_registry::PostgresRefreshRegistry;

use super::AppState;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("refresh token registry unavailable: {0}")]
    Registry(#[from] RegistryError),

    #[error("password hashing setup failed: {0}")]
    PasswordHash(#[from] PasswordHashError),
}

/// Everything `main` needs to serve and maintain the API.
pub struct AppServices {
    pub state: AppState,
    /// Undecorated registry, for background maintenance.
    pub registry: Arc<dyn RefreshTokenRegistry>,
    pub clock: Arc<dyn Clock>,
}

pub async fn build_services(token_config: &TokenConfig, server_config: &ServerConfig) -> Result<AppServices, StartupError> {
    let registry = build_registry(server_config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let hasher = Arc::new(Argon2PasswordVerifier::new()?);
    let store = Arc::new(InMemoryCredentialStore::new());
    let seeded = seed_credentials(&store, &hasher, &server_config.seed_users)?;
    if seeded.is_empty() {
        tracing::warn!("no users configured (AUTH_SEED_USERS); every login will fail");
    }

    let credentials: Arc<dyn CredentialStore> = store;
    let passwords: Arc<dyn PasswordVerifier> = hasher;
    let sessions = Arc::new(SessionController::new(
        token_config,
        registry.clone(),
        credentials.clone(),
        passwords,
        clock.clone(),
    ));

    Ok(AppServices {
        state: AppState::new(sessions, credentials),
        registry,
        clock,
    })
}

async fn build_registry(config: &ServerConfig) -> Result<Arc<dyn RefreshTokenRegistry>, StartupError> {
    match config.database_url.as_deref() {
        #[cfg(feature = "postgres")]
        Some(url) => {
            let registry = PostgresRefreshRegistry::connect(url).await?;
            registry.ensure_schema().await?;
            tracing::info!("using postgres refresh token registry");
            Ok(Arc::new(registry))
        }
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            tracing::warn!("DATABASE_URL set but postgres feature not enabled, falling back to in-memory registry");
            Ok(Arc::new(InMemoryRefreshRegistry::new()))
        }
        None => {
            tracing::info!("using in-memory refresh token registry");
            Ok(Arc::new(InMemoryRefreshRegistry::new()))
        }
    }
}
