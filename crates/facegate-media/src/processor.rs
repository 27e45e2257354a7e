//! Post-processing facade used by the request handlers.

use std::path::PathBuf;

use facegate_models::{AnnotationOptions, DetectionSet, FaceCrop};
use image::DynamicImage;
use tracing::info;

use crate::annotate::{Annotator, LabelFont};
use crate::crop::crop_faces;
use crate::encode::{encode_jpeg, DEFAULT_JPEG_QUALITY};
use crate::error::MediaResult;
use crate::filter::filter_by_score;

/// Configuration for output rendering.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// JPEG quality for crops and annotated images (1-100)
    pub jpeg_quality: u8,
    /// Optional TrueType font for score labels
    pub font_path: Option<PathBuf>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            font_path: None,
        }
    }
}

impl MediaConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            jpeg_quality: std::env::var("JPEG_QUALITY")
                .ok()
                .and_then(|s| s.parse::<u8>().ok())
                .map(|q| q.clamp(1, 100))
                .unwrap_or(DEFAULT_JPEG_QUALITY),
            font_path: std::env::var("ANNOTATION_FONT_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

/// Filter, crop and annotate detections.
///
/// Cheap to clone; the loaded font is shared.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    annotator: Annotator,
    jpeg_quality: u8,
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self {
            annotator: Annotator::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl PostProcessor {
    /// Build a post-processor, loading the label font if one is configured.
    pub fn new(config: &MediaConfig) -> MediaResult<Self> {
        let font = match &config.font_path {
            Some(path) => {
                let font = LabelFont::from_path(path)?;
                info!(path = %path.display(), "Loaded annotation font");
                font
            }
            None => LabelFont::default(),
        };

        Ok(Self {
            annotator: Annotator::new(font),
            jpeg_quality: config.jpeg_quality,
        })
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Keep detections whose score is absent or at least `score_min`.
    pub fn filter(&self, detections: DetectionSet, score_min: f32) -> DetectionSet {
        filter_by_score(detections, score_min)
    }

    /// JPEG crops of every in-bounds detection.
    pub fn crop(&self, source: &DynamicImage, detections: &DetectionSet) -> MediaResult<Vec<FaceCrop>> {
        crop_faces(source, detections, self.jpeg_quality)
    }

    /// Annotated copy of `source`, JPEG-encoded.
    pub fn annotate(
        &self,
        source: &DynamicImage,
        detections: &DetectionSet,
        options: &AnnotationOptions,
    ) -> MediaResult<Vec<u8>> {
        let canvas = self.annotator.render(source, detections, options);
        encode_jpeg(&canvas, self.jpeg_quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_models::{BoundingBox, Detection, Keypoints};
    use image::RgbImage;

    #[test]
    fn test_default_config() {
        let config = MediaConfig::default();
        assert_eq!(config.jpeg_quality, 90);
        assert!(config.font_path.is_none());
    }

    #[test]
    fn test_missing_font_fails_construction() {
        let config = MediaConfig {
            jpeg_quality: 80,
            font_path: Some(PathBuf::from("/nonexistent/label.ttf")),
        };
        assert!(PostProcessor::new(&config).is_err());
    }

    #[test]
    fn test_annotate_keeps_dimensions() {
        let source = DynamicImage::ImageRgb8(RgbImage::new(64, 48));
        let set = DetectionSet::new(vec![Detection::new(
            BoundingBox::new(4, 4, 30, 30).unwrap(),
            Some(0.93),
            Keypoints::new(),
        )]);

        let jpeg = PostProcessor::default()
            .annotate(&source, &set, &AnnotationOptions::default())
            .unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }
}
