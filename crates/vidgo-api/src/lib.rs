//! Axum HTTP API server for the VidGo generation backend.
//!
//! This crate provides:
//! - The `/tools/{tool}` generation endpoint backed by the dispatcher
//! - Demo preset and provider service-status surfaces
//! - Credit balance/history and generation history APIs
//! - Rate limiting, security headers, and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
