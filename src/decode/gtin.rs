// SPDX-License-Identifier: GPL-3.0-only

//! Product barcode engine
//!
//! Reads EAN-13/UPC-A first and falls back to QR on the same luma plane, so
//! one attempt costs a single image load and downscale.

use super::ean::read_ean;
use super::luma::LumaPlane;
use super::qr::read_qr;
use super::{DecodeEngine, DecodeOutcome, DecodeSource};
use crate::constants::MAX_DECODE_DIMENSION;
use futures::future::BoxFuture;
use std::time::Instant;
use tracing::{debug, warn};

/// EAN-13, UPC-A and QR decode engine
#[derive(Debug, Clone, Copy)]
pub struct GtinEngine {
    max_dimension: u32,
}

impl Default for GtinEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GtinEngine {
    pub fn new() -> Self {
        Self::with_max_dimension(MAX_DECODE_DIMENSION)
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }

    pub fn decode_sync(&self, source: &DecodeSource) -> DecodeOutcome {
        let start = Instant::now();
        let plane = match LumaPlane::from_source(source, self.max_dimension) {
            Ok(plane) => plane,
            Err(reason) => return DecodeOutcome::Failed(reason),
        };

        let found = read_ean(&plane).or_else(|| read_qr(&plane));
        match found {
            Some(result) => {
                debug!(
                    symbology = %result.symbology,
                    text = %result.text,
                    total_ms = start.elapsed().as_millis(),
                    "Barcode decoded"
                );
                DecodeOutcome::Found(result)
            }
            None => DecodeOutcome::NotFound,
        }
    }
}

impl DecodeEngine for GtinEngine {
    fn decode(&self, source: DecodeSource) -> BoxFuture<'static, DecodeOutcome> {
        let engine = *self;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || engine.decode_sync(&source))
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Barcode decode task panicked");
                    DecodeOutcome::Failed("decode task failed".to_string())
                })
        })
    }
}
