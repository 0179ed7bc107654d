//! SENTINEL Advisor Server
//!
//! HTTP API for the advisor pipeline: chat routing, collaboration,
//! conversation history, feedback, and the operational surface
//! (health, readiness, Prometheus metrics, admin reloads).

pub mod auth;
pub mod http;
pub mod metrics;
pub mod rate_limit;
pub mod state;

pub use auth::auth_middleware;
pub use http::create_router;
pub use metrics::{
    init_metrics, metrics_handler, record_chat, record_error, record_request, track_metrics,
};
pub use rate_limit::{RateLimitError, RateLimiter};
pub use state::AppState;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Auth(_) => axum::http::StatusCode::UNAUTHORIZED,
            ServerError::RateLimit => axum::http::StatusCode::TOO_MANY_REQUESTS,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
