//! Token issuance, verification and session lifecycle.
//!
//! This crate is decoupled from HTTP and storage: the refresh token registry
//! and the credential store are traits, with in-memory implementations here
//! and durable ones in `sessiongate-infra`.

pub mod authorize;
pub mod claims;
pub mod config;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod in_memory_registry;
pub mod issuer;
pub mod pipeline;
pub mod registry;
pub mod roles;
pub mod session;
pub mod verifier;

pub use authorize::{require_any_role, require_owner_or_admin, require_role, AccessRule};
pub use claims::{AccessClaims, RefreshClaims, TokenClaims, TokenType};
pub use config::{ConfigError, ReusePolicy, Secret, TokenConfig};
pub use credentials::{CredentialStore, CredentialStoreError, InMemoryCredentialStore, PasswordVerifier, StoredCredential};
pub use error::AuthError;
pub use identity::Identity;
pub use in_memory_registry::InMemoryRefreshRegistry;
pub use issuer::{TokenIssuer, TokenPair};
pub use pipeline::authenticate;
pub use registry::{purge_cutoff, DeadlineRegistry, RefreshTokenRegistry, RegistryEntry, RegistryError};
pub use roles::Role;
pub use session::SessionController;
pub use verifier::TokenVerifier;
