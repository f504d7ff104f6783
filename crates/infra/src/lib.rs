//! Infrastructure layer: durable registry, password hashing, env config.

pub mod config;
pub mod credentials;
pub mod refresh_registry;
