//! Credential-side adapters: Argon2 password hashing and dev user seeding.
//!
//! The credential store itself (`InMemoryCredentialStore`) lives in
//! `sessiongate-auth`; a real deployment plugs in its own user database.

pub mod argon;
pub mod seed;

pub use argon::{Argon2PasswordVerifier, PasswordHashError};
pub use seed::{parse_seed_users, seed_credentials, SeedUser};
