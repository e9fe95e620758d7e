//! HTTP API of the retail service: configuration, request context, role
//! gating and the axum router.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;
