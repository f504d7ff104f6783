//! HTTP API: routing, authentication/authorization layers and error mapping.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
