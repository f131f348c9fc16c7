// SPDX-License-Identifier: GPL-3.0-only

//! QR code decode engine
//!
//! Adapts the `rqrr` decoder to [`DecodeEngine`]. Frames are reduced to a
//! luma plane and optionally downscaled before detection, which keeps a
//! single attempt cheap enough for the 50ms poll cadence.

use super::luma::LumaPlane;
use super::{DecodeEngine, DecodeOutcome, DecodeSource, DecodedResult};
use crate::constants::MAX_DECODE_DIMENSION;
use futures::future::BoxFuture;
use tracing::{debug, trace, warn};

/// QR decode engine
#[derive(Debug, Clone, Copy)]
pub struct QrEngine {
    /// Maximum dimension for processing (frames are downscaled to this)
    max_dimension: u32,
}

impl Default for QrEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QrEngine {
    pub fn new() -> Self {
        Self::with_max_dimension(MAX_DECODE_DIMENSION)
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }

    /// Synchronous decode (runs in a blocking task)
    pub fn decode_sync(&self, source: &DecodeSource) -> DecodeOutcome {
        let start = std::time::Instant::now();
        let plane = match LumaPlane::from_source(source, self.max_dimension) {
            Ok(plane) => plane,
            Err(reason) => return DecodeOutcome::Failed(reason),
        };
        trace!(
            width = plane.width,
            height = plane.height,
            prepare_ms = start.elapsed().as_millis(),
            "Prepared luma plane"
        );

        match read_qr(&plane) {
            Some(result) => {
                debug!(total_ms = start.elapsed().as_millis(), "QR decode finished");
                DecodeOutcome::Found(result)
            }
            None => DecodeOutcome::NotFound,
        }
    }
}

/// Detect and decode the first readable QR grid in a plane
pub(crate) fn read_qr(plane: &LumaPlane) -> Option<DecodedResult> {
    let width = plane.width;
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, plane.height, |x, y| {
        plane.data[y * width + x]
    });

    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_meta, content)) => {
                debug!(content = %content, "Decoded QR code");
                return Some(DecodedResult::new(content, "QR"));
            }
            Err(e) => debug!(error = %e, "Failed to decode QR grid"),
        }
    }
    None
}

impl DecodeEngine for QrEngine {
    fn decode(&self, source: DecodeSource) -> BoxFuture<'static, DecodeOutcome> {
        let engine = *self;
        Box::pin(async move {
            // CPU-bound; keep it off the async workers
            tokio::task::spawn_blocking(move || engine.decode_sync(&source))
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "QR decode task panicked");
                    DecodeOutcome::Failed("decode task failed".to_string())
                })
        })
    }
}
