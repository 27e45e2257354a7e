//! Response bodies for each detection mode.

use serde::{Deserialize, Serialize};

use crate::detection::{BoundingBox, Detection, DetectionSet, Keypoints};

/// `GET /` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// `POST /detect` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxesResponse {
    pub boxes: Vec<BoundingBox>,
}

impl From<&DetectionSet> for BoxesResponse {
    fn from(set: &DetectionSet) -> Self {
        Self { boxes: set.boxes() }
    }
}

/// `POST /detect/keypoints` body. `keypoints[i]` belongs to `boxes[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeypointsResponse {
    pub boxes: Vec<BoundingBox>,
    pub keypoints: Vec<Keypoints>,
}

impl From<&DetectionSet> for KeypointsResponse {
    fn from(set: &DetectionSet) -> Self {
        Self {
            boxes: set.boxes(),
            keypoints: set.keypoints(),
        }
    }
}

pub type DetectionRecord = Detection;

/// `POST /detect/full` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullResponse {
    pub detections: Vec<DetectionRecord>,
}

impl From<DetectionSet> for FullResponse {
    fn from(set: DetectionSet) -> Self {
        Self {
            detections: set.into_inner(),
        }
    }
}

/// A cropped face encoded as base64 JPEG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceCrop {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub score: Option<f32>,
    pub image_base64: String,
}

/// `POST /detect/crop` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropResponse {
    pub faces: Vec<FaceCrop>,
}
