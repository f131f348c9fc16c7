// SPDX-License-Identifier: GPL-3.0-only

//! Single-shot decode of one static image
//!
//! Used for uploaded files and for the frame frozen by `pause()`. Unlike the
//! live loop there is exactly one decode attempt per call.

use super::{
    DecodeEngine, DecodeOutcome, DecodeSource, DecodedResult, EncodedImage, ImageCodecBridge,
    ImageContainer,
};
use crate::backends::camera::{CameraFrame, PixelFormat};
use crate::errors::{ScanError, ScanResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// RGBA snapshot of a live frame, taken at pause time
#[derive(Debug, Clone)]
pub struct FrozenFrame {
    /// Tightly packed RGBA pixels
    pub image_bytes: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
}

impl FrozenFrame {
    /// Copy a camera frame into packed RGBA
    ///
    /// Returns `None` if the frame's buffer does not match its geometry.
    pub fn capture(frame: &CameraFrame) -> Option<Self> {
        if !frame.is_well_formed() {
            return None;
        }

        let packed_stride = frame.width * 4;
        let image_bytes: Arc<[u8]> = match frame.format {
            // Already packed: share the buffer
            PixelFormat::RGBA if frame.stride == packed_stride => Arc::clone(&frame.data),
            PixelFormat::RGBA => {
                let row = packed_stride as usize;
                let mut out = Vec::with_capacity(row * frame.height as usize);
                for y in 0..frame.height as usize {
                    let start = y * frame.stride as usize;
                    out.extend_from_slice(&frame.data[start..start + row]);
                }
                out.into()
            }
            PixelFormat::Gray8 => {
                let mut out = Vec::with_capacity(packed_stride as usize * frame.height as usize);
                for y in 0..frame.height {
                    for x in 0..frame.width {
                        let l = frame.luma_at(x, y);
                        out.extend_from_slice(&[l, l, l, 255]);
                    }
                }
                out.into()
            }
        };

        Some(Self {
            image_bytes,
            width: frame.width,
            height: frame.height,
        })
    }

    pub fn to_camera_frame(&self) -> CameraFrame {
        CameraFrame::from_rgba(self.width, self.height, Arc::clone(&self.image_bytes))
    }
}

/// Input to [`StillImagePipeline::decode`]
#[derive(Debug, Clone)]
pub enum StillImage {
    /// Encoded file contents, with the file name if one is known
    Upload { bytes: Vec<u8>, name: Option<String> },
    /// Frame frozen by `pause()`
    Frozen(FrozenFrame),
}

/// Sniff, transcode if needed, decode once
#[derive(Clone)]
pub struct StillImagePipeline {
    engine: Arc<dyn DecodeEngine>,
    bridge: Arc<dyn ImageCodecBridge>,
}

impl StillImagePipeline {
    pub fn new(engine: Arc<dyn DecodeEngine>, bridge: Arc<dyn ImageCodecBridge>) -> Self {
        Self { engine, bridge }
    }

    pub async fn decode(&self, input: StillImage) -> ScanResult<DecodedResult> {
        match input {
            StillImage::Upload { bytes, name } => self.decode_upload(bytes, name.as_deref()).await,
            StillImage::Frozen(frame) => self.decode_frozen(&frame).await,
        }
    }

    async fn decode_upload(&self, bytes: Vec<u8>, name: Option<&str>) -> ScanResult<DecodedResult> {
        if bytes.is_empty() {
            return Err(ScanError::UnsupportedImage("the file is empty".to_string()));
        }

        let container = ImageContainer::sniff(&bytes, name).ok_or_else(|| {
            ScanError::UnsupportedImage(match name {
                Some(name) => format!("{} is not a recognised image", name),
                None => "not a recognised image".to_string(),
            })
        })?;

        let (bytes, container) = if self.engine.accepts(container) {
            (bytes, container)
        } else {
            info!(from = %container, bytes = bytes.len(), "Transcoding upload before decode");
            let png = self
                .bridge
                .transcode(bytes, container)
                .await
                .map_err(|e| {
                    warn!(error = %e, "Transcode failed, skipping decode");
                    ScanError::TranscodeFailure(e.to_string())
                })?;
            (png, ImageContainer::PNG)
        };

        let source = DecodeSource::Image(EncodedImage {
            bytes: bytes.into(),
            container,
        });
        match self.engine.decode(source).await {
            DecodeOutcome::Found(result) => Ok(result),
            DecodeOutcome::NotFound => Err(ScanError::not_found_in_upload()),
            DecodeOutcome::Failed(reason) => {
                debug!(%reason, "Engine could not read the upload");
                Err(ScanError::not_found_in_upload())
            }
        }
    }

    async fn decode_frozen(&self, frame: &FrozenFrame) -> ScanResult<DecodedResult> {
        debug!(width = frame.width, height = frame.height, "Decoding frozen frame");
        match self
            .engine
            .decode(DecodeSource::Frame(frame.to_camera_frame()))
            .await
        {
            DecodeOutcome::Found(result) => Ok(result),
            DecodeOutcome::NotFound => Err(ScanError::not_found_in_capture()),
            DecodeOutcome::Failed(reason) => {
                debug!(%reason, "Engine could not read the frozen frame");
                Err(ScanError::not_found_in_capture())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_shares_packed_rgba() {
        let frame = CameraFrame::from_rgba(2, 2, vec![7u8; 16]);
        let frozen = FrozenFrame::capture(&frame).unwrap();
        assert!(Arc::ptr_eq(&frozen.image_bytes, &frame.data));
        assert_eq!((frozen.width, frozen.height), (2, 2));
    }

    #[test]
    fn test_capture_strips_row_padding() {
        let mut frame = CameraFrame::from_rgba(1, 2, vec![1, 2, 3, 4, 0, 0, 5, 6, 7, 8]);
        frame.stride = 6;
        let frozen = FrozenFrame::capture(&frame).unwrap();
        assert_eq!(&*frozen.image_bytes, &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_capture_expands_gray() {
        let frame = CameraFrame {
            format: PixelFormat::Gray8,
            stride: 2,
            ..CameraFrame::from_rgba(2, 1, vec![10u8, 20])
        };
        let frozen = FrozenFrame::capture(&frame).unwrap();
        assert_eq!(&*frozen.image_bytes, &[10, 10, 10, 255, 20, 20, 20, 255]);
    }

    #[test]
    fn test_capture_rejects_short_buffer() {
        let frame = CameraFrame::from_rgba(4, 4, vec![0u8; 8]);
        assert!(FrozenFrame::capture(&frame).is_none());
    }
}
