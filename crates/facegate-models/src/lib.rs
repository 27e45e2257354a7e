//! Shared data models for the facegate service.
//!
//! This crate provides Serde-serializable types for:
//! - Detections in corner-box form with optional confidence and keypoints
//! - Detector parameters and annotation options
//! - Detection modes exposed over HTTP
//! - Response schemas for every detection mode

pub mod detection;
pub mod mode;
pub mod params;
pub mod response;

pub use detection::{BoundingBox, Detection, DetectionSet, InvalidBox, Keypoints, Point};
pub use mode::{DetectionMode, DetectionModeParseError};
pub use params::{AnnotationOptions, DetectionParams};
pub use response::{
    BoxesResponse, CropResponse, DetectionRecord, FaceCrop, FullResponse, KeypointsResponse,
    MessageResponse,
};
