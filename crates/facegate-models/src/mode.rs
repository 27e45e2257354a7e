//! Detection modes exposed by the HTTP API.
//!
//! - `Boxes`: bounding boxes only
//! - `Keypoints`: boxes plus facial landmarks
//! - `Full`: boxes, landmarks and confidence, filtered by `score_min`
//! - `Crop`: one encoded image per face
//! - `Annotated`: a single encoded image with overlays

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    Boxes,
    Keypoints,
    Full,
    Crop,
    Annotated,
}

impl DetectionMode {
    /// All detection modes.
    pub const ALL: &'static [DetectionMode] = &[
        DetectionMode::Boxes,
        DetectionMode::Keypoints,
        DetectionMode::Full,
        DetectionMode::Crop,
        DetectionMode::Annotated,
    ];

    /// Returns the mode name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMode::Boxes => "detect",
            DetectionMode::Keypoints => "keypoints",
            DetectionMode::Full => "full",
            DetectionMode::Crop => "crop",
            DetectionMode::Annotated => "annotated",
        }
    }

    /// Route path serving this mode.
    pub fn path(&self) -> &'static str {
        match self {
            DetectionMode::Boxes => "/detect",
            DetectionMode::Keypoints => "/detect/keypoints",
            DetectionMode::Full => "/detect/full",
            DetectionMode::Crop => "/detect/crop",
            DetectionMode::Annotated => "/detect/annotated",
        }
    }

    /// Default `score_min` for modes that filter by confidence.
    pub fn default_score_min(&self) -> f32 {
        match self {
            DetectionMode::Full => 0.8,
            _ => 0.0,
        }
    }

    /// Returns true if the response carries keypoints.
    pub fn includes_keypoints(&self) -> bool {
        matches!(self, DetectionMode::Keypoints | DetectionMode::Full)
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DetectionMode {
    type Err = DetectionModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "detect" | "boxes" => Ok(DetectionMode::Boxes),
            "keypoints" => Ok(DetectionMode::Keypoints),
            "full" => Ok(DetectionMode::Full),
            "crop" => Ok(DetectionMode::Crop),
            "annotated" | "annotate" => Ok(DetectionMode::Annotated),
            _ => Err(DetectionModeParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown detection mode: {0}")]
pub struct DetectionModeParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("detect".parse::<DetectionMode>().unwrap(), DetectionMode::Boxes);
        assert_eq!("boxes".parse::<DetectionMode>().unwrap(), DetectionMode::Boxes);
        assert_eq!(" Full ".parse::<DetectionMode>().unwrap(), DetectionMode::Full);
        assert_eq!("annotate".parse::<DetectionMode>().unwrap(), DetectionMode::Annotated);
        assert!("video".parse::<DetectionMode>().is_err());
    }

    #[test]
    fn test_mode_roundtrips_through_name() {
        for mode in DetectionMode::ALL {
            assert_eq!(mode.as_str().parse::<DetectionMode>().unwrap(), *mode);
        }
    }

    #[test]
    fn test_default_score_min() {
        assert_eq!(DetectionMode::Full.default_score_min(), 0.8);
        assert_eq!(DetectionMode::Crop.default_score_min(), 0.0);
        assert_eq!(DetectionMode::Annotated.default_score_min(), 0.0);
    }
}
