//! Per-face crops.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use facegate_models::{BoundingBox, DetectionSet, FaceCrop};
use image::{DynamicImage, GenericImageView, RgbImage};
use tracing::debug;

use crate::encode::encode_jpeg;
use crate::error::MediaResult;

/// Cut the clipped region of `bbox` out of `source`.
///
/// Returns `None` when nothing with positive area lies inside the image.
/// The source is never modified.
pub fn crop_region(source: &DynamicImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let (width, height) = source.dimensions();
    let clipped = bbox.clip(width, height)?;

    let region = source.crop_imm(
        clipped.x1() as u32,
        clipped.y1() as u32,
        clipped.width() as u32,
        clipped.height() as u32,
    );

    Some(region.to_rgb8())
}

/// Crop and JPEG-encode every detection that overlaps the image.
///
/// Detections entirely outside the image are skipped; the reported box is the
/// detector's own, not the clipped one.
pub fn crop_faces(
    source: &DynamicImage,
    detections: &DetectionSet,
    jpeg_quality: u8,
) -> MediaResult<Vec<FaceCrop>> {
    let mut faces = Vec::with_capacity(detections.len());

    for detection in detections {
        let Some(region) = crop_region(source, &detection.bbox) else {
            debug!(bbox = ?detection.bbox.to_array(), "Skipping crop outside image bounds");
            continue;
        };

        let jpeg = encode_jpeg(&region, jpeg_quality)?;
        faces.push(FaceCrop {
            bbox: detection.bbox,
            score: detection.score,
            image_base64: STANDARD.encode(jpeg),
        });
    }

    Ok(faces)
}
