//! Upload decoding.

use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::error::{DetectorError, DetectorResult};

/// An uploaded image together with its decoded raster.
///
/// The raster is shared read-only by every post-processing step of a request;
/// steps that draw or crop work on their own copies.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    bytes: Vec<u8>,
    format: ImageFormat,
    raster: DynamicImage,
}

impl DecodedImage {
    /// Decode raw upload bytes.
    ///
    /// Fails with [`DetectorError::InvalidImage`] for unknown formats,
    /// malformed data, and zero-sized rasters.
    pub fn decode(bytes: Vec<u8>) -> DetectorResult<Self> {
        if bytes.is_empty() {
            return Err(DetectorError::invalid_image("empty upload"));
        }

        let format = image::guess_format(&bytes)
            .map_err(|e| DetectorError::invalid_image(format!("unrecognized format: {}", e)))?;
        let raster = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| DetectorError::invalid_image(e.to_string()))?;

        let (width, height) = raster.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectorError::invalid_image(format!(
                "zero-sized image ({}x{})",
                width, height
            )));
        }

        Ok(Self {
            bytes,
            format,
            raster,
        })
    }

    /// Original encoded bytes, as uploaded.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// MIME type of the original upload.
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn raster(&self) -> &DynamicImage {
        &self.raster
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }
}
