//! Refresh token registry backends.
//!
//! - `InMemoryRefreshRegistry` (re-exported from `sessiongate-auth`): tests/dev
//! - [`PostgresRefreshRegistry`] (feature `postgres`): durable and shared
//!   between API instances, so revocation survives restarts

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod purge;

pub use sessiongate_auth::InMemoryRefreshRegistry;

#[cfg(feature = "postgres")]
pub use postgres::PostgresRefreshRegistry;
pub use purge::{PurgeWorker, WorkerHandle};
