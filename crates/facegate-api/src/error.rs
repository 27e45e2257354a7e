//! API error types.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facegate_access::AccessError;
use facegate_detector::DetectorError;
use facegate_media::MediaError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

static HIDE_INTERNAL_DETAILS: AtomicBool = AtomicBool::new(false);

/// Replace internal error details with generic messages in responses.
/// Set once at startup from `ApiConfig::is_production`.
pub fn hide_internal_details(hide: bool) {
    HIDE_INTERNAL_DETAILS.store(hide, Ordering::Relaxed);
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error("Rendering failed: {0}")]
    Media(#[from] MediaError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) | ApiError::Media(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Access(e) => match e {
                AccessError::Unauthorized => StatusCode::UNAUTHORIZED,
                AccessError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
                AccessError::ServerMisconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
                AccessError::RateLimiterUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Detector(e) if e.is_invalid_image() => StatusCode::BAD_REQUEST,
            ApiError::Detector(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::RateLimited => "rate_limited",
            ApiError::Internal(_) | ApiError::Media(_) => "internal",
            ApiError::Access(e) => match e {
                AccessError::Unauthorized => "unauthorized",
                AccessError::QuotaExceeded { .. } => "quota_exceeded",
                AccessError::ServerMisconfigured(_) => "server_misconfigured",
                AccessError::RateLimiterUnavailable(_) => "rate_limiter_unavailable",
            },
            ApiError::Detector(e) if e.is_invalid_image() => "invalid_image",
            ApiError::Detector(_) => "detector_failure",
        }
    }

    /// Whether the detail may leak server internals.
    fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_)
                | ApiError::Media(_)
                | ApiError::Access(AccessError::RateLimiterUnavailable(_))
                | ApiError::Access(AccessError::ServerMisconfigured(_))
        ) || matches!(self, ApiError::Detector(e) if !e.is_invalid_image())
    }

    /// Client-facing detail.
    fn detail(&self, hide_internal: bool) -> String {
        if !(hide_internal && self.is_internal()) {
            return self.to_string();
        }
        match self.status_code() {
            StatusCode::BAD_GATEWAY => "Face detector unavailable".to_string(),
            StatusCode::SERVICE_UNAVAILABLE => "Rate limiter unavailable".to_string(),
            _ => "An internal error occurred".to_string(),
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }

        // Don't expose internal error details in production
        let detail = self.detail(HIDE_INTERNAL_DETAILS.load(Ordering::Relaxed));

        let body = ErrorResponse {
            detail,
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}
