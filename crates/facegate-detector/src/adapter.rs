//! Detector Adapter - runs the external detector and normalizes its output.
//!
//! This is the only place raw detector records are turned into
//! [`DetectionSet`]s. Whatever backend sits behind [`FaceDetector`], callers
//! always receive corner-form boxes with integer coordinates, optional scores
//! and integer keypoints, in the backend's native order.

use std::sync::Arc;
use std::time::Instant;

use facegate_models::{DetectionParams, DetectionSet};
use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::decode::DecodedImage;
use crate::detector::FaceDetector;
use crate::error::{DetectorError, DetectorResult};
use crate::raw::normalize_all;

/// Metric names.
pub mod names {
    pub const DETECTOR_DURATION_SECONDS: &str = "facegate_detector_duration_seconds";
    pub const DETECTOR_FAILURES_TOTAL: &str = "facegate_detector_failures_total";
    pub const DETECTIONS_DROPPED_TOTAL: &str = "facegate_detections_dropped_total";
}

/// Adapts any [`FaceDetector`] to the normalized detection contract.
#[derive(Clone)]
pub struct DetectorAdapter {
    detector: Arc<dyn FaceDetector>,
}

impl DetectorAdapter {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        Self { detector }
    }

    /// Name of the wrapped backend.
    pub fn backend(&self) -> &'static str {
        self.detector.name()
    }

    pub async fn health_check(&self) -> bool {
        self.detector.health_check().await
    }

    /// Detect faces in an already decoded upload.
    ///
    /// Backend errors surface as detector failures; an `InvalidImage` raised by
    /// the backend itself (it refused the bytes) is propagated as such.
    pub async fn detect(
        &self,
        image: &DecodedImage,
        params: &DetectionParams,
    ) -> DetectorResult<DetectionSet> {
        let backend = self.detector.name();
        let start = Instant::now();

        let raws = match self.detector.detect(image, params).await {
            Ok(raws) => raws,
            Err(e) => {
                warn!(backend, error = %e, "Face detector failed");
                counter!(names::DETECTOR_FAILURES_TOTAL, "backend" => backend).increment(1);
                return Err(match e {
                    e @ (DetectorError::InvalidImage(_) | DetectorError::Failed(_)) => e,
                    other => DetectorError::failed(other.to_string()),
                });
            }
        };

        histogram!(names::DETECTOR_DURATION_SECONDS, "backend" => backend)
            .record(start.elapsed().as_secs_f64());

        let (set, dropped) = normalize_all(&raws, self.detector.box_format());
        if dropped > 0 {
            counter!(names::DETECTIONS_DROPPED_TOTAL, "backend" => backend)
                .increment(dropped as u64);
        }

        debug!(
            backend,
            raw = raws.len(),
            kept = set.len(),
            dropped,
            width = image.width(),
            height = image.height(),
            "Detection complete"
        );

        Ok(set)
    }

    /// Decode `bytes` and detect faces in one step.
    pub async fn decode_and_detect(
        &self,
        bytes: Vec<u8>,
        params: &DetectionParams,
    ) -> DetectorResult<(DecodedImage, DetectionSet)> {
        let image = DecodedImage::decode(bytes)?;
        let set = self.detect(&image, params).await?;
        Ok((image, set))
    }
}
