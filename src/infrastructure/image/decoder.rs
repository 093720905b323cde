//! Image decoding with the `image` crate.

use std::io::Cursor;

use image::error::LimitErrorKind;
use image::{DynamicImage, ImageError, ImageReader, Limits};
use tracing::trace;

use crate::domain::entities::{Resource, ResourceSpec};
use crate::domain::errors::ResourceError;
use crate::domain::ports::ResourceDecoder;
use crate::infrastructure::config::DecodeConfig;

impl Resource for DynamicImage {
    fn size_bytes(&self) -> usize {
        self.as_bytes().len()
    }
}

/// Decodes PNG, JPEG and WebP bytes, downscaling to the request's bounds.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    max_alloc_bytes: u64,
}

impl ImageDecoder {
    /// Creates a decoder from configuration.
    #[must_use]
    pub const fn new(config: &DecodeConfig) -> Self {
        Self {
            max_alloc_bytes: config.max_alloc_bytes,
        }
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_alloc_bytes);
        limits
    }
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self::new(&DecodeConfig::default())
    }
}

impl ResourceDecoder<DynamicImage> for ImageDecoder {
    fn decode(
        &self,
        url: &str,
        bytes: &[u8],
        spec: &ResourceSpec,
    ) -> Result<DynamicImage, ResourceError> {
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ResourceError::decode(url, format!("Failed to sniff format: {e}")))?;
        reader.limits(self.limits());

        let img = reader.decode().map_err(|e| map_image_error(url, e))?;

        if spec.exceeds(img.width(), img.height()) {
            let width = spec.max_width.unwrap_or(img.width());
            let height = spec.max_height.unwrap_or(img.height());
            trace!(url, from_width = img.width(), from_height = img.height(), width, height, "Downscaling image");
            return Ok(img.resize(width, height, image::imageops::FilterType::Lanczos3));
        }
        Ok(img)
    }
}

fn map_image_error(url: &str, error: ImageError) -> ResourceError {
    match error {
        ImageError::Limits(limit) if matches!(limit.kind(), LimitErrorKind::InsufficientMemory) => {
            ResourceError::out_of_memory(format!("decoding {url}"))
        }
        other => ResourceError::decode(url, format!("Failed to decode image: {other}")),
    }
}
