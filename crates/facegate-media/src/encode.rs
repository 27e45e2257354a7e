//! JPEG output encoding.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::MediaResult;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Encode an RGB raster as JPEG.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> MediaResult<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(image)?;
    Ok(out)
}
