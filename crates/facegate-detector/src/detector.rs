//! The external detector seam.

use async_trait::async_trait;
use facegate_models::DetectionParams;

use crate::decode::DecodedImage;
use crate::error::DetectorResult;
use crate::raw::{BoxFormat, RawDetection};

/// A pretrained face detector.
///
/// Implementations wrap a concrete backend (an inference service, an
/// in-process library) behind a uniform interface. Parameters must be
/// forwarded unchanged; range checking is the backend's business.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Run detection on one image and return the backend's raw records in
    /// its native order.
    async fn detect(
        &self,
        image: &DecodedImage,
        params: &DetectionParams,
    ) -> DetectorResult<Vec<RawDetection>>;

    /// Box layout of the records returned by [`FaceDetector::detect`].
    fn box_format(&self) -> BoxFormat {
        BoxFormat::Xywh
    }

    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Whether the backend is reachable.
    async fn health_check(&self) -> bool {
        true
    }
}
