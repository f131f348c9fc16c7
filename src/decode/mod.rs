// SPDX-License-Identifier: GPL-3.0-only

//! Barcode decoding
//!
//! The symbol decoder itself sits behind [`DecodeEngine`]; this module only
//! defines what goes in and out of it, plus the still-image pipeline that
//! gets arbitrary uploads into a shape the engine accepts.

pub mod container;
pub mod ean;
pub mod gtin;
pub mod luma;
pub mod qr;
pub mod still_image;
pub mod transcode;

pub use container::ImageContainer;
pub use gtin::GtinEngine;
pub use qr::QrEngine;
pub use still_image::{FrozenFrame, StillImage, StillImagePipeline};
pub use transcode::{ImageCodecBridge, RasterBridge, TranscodeError};

use crate::backends::camera::CameraFrame;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;

/// A decoded symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedResult {
    /// Payload text
    pub text: String,
    /// Symbology reported by the engine ("EAN-13", "UPC-A", "QR", "manual")
    pub symbology: String,
    pub timestamp: DateTime<Utc>,
}

impl DecodedResult {
    pub fn new(text: impl Into<String>, symbology: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            symbology: symbology.into(),
            timestamp: Utc::now(),
        }
    }
}

/// An encoded image in a container the engine said it accepts
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Arc<[u8]>,
    pub container: ImageContainer,
}

/// Input to a single decode attempt
#[derive(Debug, Clone)]
pub enum DecodeSource {
    /// A raw frame, live or frozen
    Frame(CameraFrame),
    /// An encoded still image
    Image(EncodedImage),
}

/// Outcome of a single decode attempt
///
/// "Nothing found" is an ordinary outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Found(DecodedResult),
    NotFound,
    /// The input could not be read at all (corrupt image, bad geometry)
    Failed(String),
}

/// Barcode decode capability
pub trait DecodeEngine: Send + Sync {
    /// Whether `decode` can take images in this container directly
    fn accepts(&self, container: ImageContainer) -> bool {
        container.is_standard()
    }

    /// Run exactly one decode attempt
    fn decode(&self, source: DecodeSource) -> BoxFuture<'static, DecodeOutcome>;
}
