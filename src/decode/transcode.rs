// SPDX-License-Identifier: GPL-3.0-only

//! Transcoding of containers the decode engine cannot read

use super::container::ImageContainer;
use futures::future::BoxFuture;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use tracing::{debug, warn};

/// Failure to convert an image into a standard container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeError {
    pub container: ImageContainer,
    pub reason: String,
}

impl std::fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} image could not be converted: {}", self.container, self.reason)
    }
}

impl std::error::Error for TranscodeError {}

/// Image codec capability converting exotic containers to PNG
pub trait ImageCodecBridge: Send + Sync {
    /// Convert `bytes` (in `source` format) to PNG
    fn transcode(
        &self,
        bytes: Vec<u8>,
        source: ImageContainer,
    ) -> BoxFuture<'static, Result<Vec<u8>, TranscodeError>>;
}

/// Bridge over the `image` crate
///
/// Handles every raster format `image` was built with. HEIF goes through
/// libheif when the `heif` feature is enabled and is reported as a failure
/// otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterBridge;

impl RasterBridge {
    pub fn transcode_sync(bytes: &[u8], source: ImageContainer) -> Result<Vec<u8>, TranscodeError> {
        let fail = |reason: String| TranscodeError {
            container: source,
            reason,
        };

        let img = match source {
            ImageContainer::Raster(format) => image::load_from_memory_with_format(bytes, format)
                .map_err(|e| fail(e.to_string()))?,
            ImageContainer::Heif => DynamicImage::ImageRgba8(decode_heif(bytes).map_err(fail)?),
        };

        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, ImageFormat::Png)
            .map_err(|e| fail(e.to_string()))?;

        debug!(
            from = %source,
            width = img.width(),
            height = img.height(),
            bytes = png.get_ref().len(),
            "Transcoded image to PNG"
        );
        Ok(png.into_inner())
    }
}

/// Decode the primary image of a HEIF container
#[cfg(feature = "heif")]
fn decode_heif(bytes: &[u8]) -> Result<RgbaImage, String> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(bytes).map_err(|e| e.to_string())?;
    let handle = ctx.primary_image_handle().map_err(|e| e.to_string())?;
    let decoded = lib_heif
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgba), None)
        .map_err(|e| e.to_string())?;

    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| "decoded HEIF image has no interleaved plane".to_string())?;

    // Rows may be padded past width * 4
    let row_bytes = plane.width as usize * 4;
    let mut rgba = Vec::with_capacity(row_bytes * plane.height as usize);
    for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
        rgba.extend_from_slice(&row[..row_bytes]);
    }
    RgbaImage::from_raw(plane.width, plane.height, rgba)
        .ok_or_else(|| "decoded HEIF plane is truncated".to_string())
}

#[cfg(not(feature = "heif"))]
fn decode_heif(_bytes: &[u8]) -> Result<RgbaImage, String> {
    Err("HEIC/HEIF images are not supported; export the photo as JPEG or PNG".to_string())
}

impl ImageCodecBridge for RasterBridge {
    fn transcode(
        &self,
        bytes: Vec<u8>,
        source: ImageContainer,
    ) -> BoxFuture<'static, Result<Vec<u8>, TranscodeError>> {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || Self::transcode_sync(&bytes, source))
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Transcode task panicked");
                    Err(TranscodeError {
                        container: source,
                        reason: "conversion task failed".to_string(),
                    })
                })
        })
    }
}
