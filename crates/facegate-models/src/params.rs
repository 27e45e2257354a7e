//! Detector parameters and rendering options.

use serde::{Deserialize, Serialize};

/// Parameters handed to the external cascade detector.
///
/// Values are passed through unchanged; neither the ranges nor the
/// conventional non-decreasing strictness across stages are enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionParams {
    /// Minimum face size in pixels
    #[serde(default = "default_min_face_size")]
    pub min_face_size: u32,
    /// Proposal stage (P-Net) threshold
    #[serde(default = "default_threshold_pnet")]
    pub threshold_pnet: f32,
    /// Refinement stage (R-Net) threshold
    #[serde(default = "default_threshold_rnet")]
    pub threshold_rnet: f32,
    /// Output stage (O-Net) threshold
    #[serde(default = "default_threshold_onet")]
    pub threshold_onet: f32,
}

fn default_min_face_size() -> u32 {
    20
}

fn default_threshold_pnet() -> f32 {
    0.6
}

fn default_threshold_rnet() -> f32 {
    0.7
}

fn default_threshold_onet() -> f32 {
    0.7
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            min_face_size: default_min_face_size(),
            threshold_pnet: default_threshold_pnet(),
            threshold_rnet: default_threshold_rnet(),
            threshold_onet: default_threshold_onet(),
        }
    }
}

/// Overlay options for the annotated image mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationOptions {
    #[serde(default = "default_true")]
    pub draw_keypoints: bool,
    #[serde(default = "default_true")]
    pub draw_scores: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AnnotationOptions {
    fn default() -> Self {
        Self {
            draw_keypoints: true,
            draw_scores: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults_fill_missing_fields() {
        let params: DetectionParams = serde_json::from_str(r#"{"threshold_onet": 0.9}"#).unwrap();
        assert_eq!(params.min_face_size, 20);
        assert_eq!(params.threshold_pnet, 0.6);
        assert_eq!(params.threshold_rnet, 0.7);
        assert_eq!(params.threshold_onet, 0.9);
    }

    #[test]
    fn test_out_of_range_thresholds_are_kept() {
        let params: DetectionParams = serde_json::from_str(r#"{"threshold_pnet": 1.5}"#).unwrap();
        assert_eq!(params.threshold_pnet, 1.5);
    }
}
