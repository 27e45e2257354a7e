//! Detector Adapter for the facegate service.
//!
//! This crate provides:
//! - Upload decoding with a terminal `InvalidImage` error
//! - The `FaceDetector` trait every backend implements
//! - Best-effort normalization of raw detector records
//! - An HTTP client for an MTCNN inference service

pub mod adapter;
pub mod decode;
pub mod detector;
pub mod error;
pub mod mtcnn;
pub mod raw;

pub use adapter::DetectorAdapter;
pub use decode::DecodedImage;
pub use detector::FaceDetector;
pub use error::{DetectorError, DetectorResult};
pub use mtcnn::{MtcnnClient, MtcnnClientConfig};
pub use raw::{coerce_coordinate, normalize, normalize_all, BoxFormat, MalformedDetection, RawDetection};
