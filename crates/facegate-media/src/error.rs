//! Error types for post-processing.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for post-processing operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while rendering or encoding output images.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Font file not found: {0}")]
    FontNotFound(PathBuf),

    #[error("Invalid font {path}: {message}")]
    InvalidFont { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
