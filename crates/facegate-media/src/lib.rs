//! Result post-processing for the facegate service.
//!
//! This crate provides:
//! - Confidence filtering that preserves detector order
//! - Per-face JPEG crops, skipping boxes outside the image
//! - Annotated overlays with boxes, keypoints and score labels

pub mod annotate;
pub mod crop;
pub mod encode;
pub mod error;
pub mod filter;
pub mod glyphs;
pub mod processor;

pub use annotate::{format_score, label_origin, Annotator, LabelFont, LABEL_MARGIN};
pub use crop::{crop_faces, crop_region};
pub use encode::{encode_jpeg, DEFAULT_JPEG_QUALITY};
pub use error::{MediaError, MediaResult};
pub use filter::{filter_by_score, passes};
pub use processor::{MediaConfig, PostProcessor};
