//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the wallet service.

mod auth;
mod handlers;
mod rate_limit;
mod server;

pub use handlers::Caller;
pub use rate_limit::RateLimiterState;
pub use server::HttpServer;
