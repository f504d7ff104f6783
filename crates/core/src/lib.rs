//! Shared building blocks: identifiers, time source and domain errors.
//!
//! This crate has no knowledge of tokens, storage or HTTP.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{TokenId, UserId};
