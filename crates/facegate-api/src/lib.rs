//! Axum HTTP API server for face detection.
//!
//! This crate provides:
//! - One multipart upload endpoint per detection mode
//! - API key authentication and per-identity call budgets
//! - Per-IP flood protection and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{ApiConfig, CounterBackend};
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
