//! Detector error types.

use thiserror::Error;

pub type DetectorResult<T> = Result<T, DetectorError>;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Detector failed: {0}")]
    Failed(String),

    #[error("Invalid detector response: {0}")]
    InvalidResponse(String),

    #[error("Detector timed out after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DetectorError {
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// True when the caller's upload is at fault. Everything else is a
    /// failure of the external detector.
    pub fn is_invalid_image(&self) -> bool {
        matches!(self, DetectorError::InvalidImage(_))
    }
}
