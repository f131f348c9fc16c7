// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the scanner
//!
//! Session operations never hand these back to the caller. They are rendered
//! into the user-facing `scan_error` string instead. Still-image decodes are
//! the exception: they return [`ScanError`] to whoever asked for the decode.

use std::fmt;

use crate::backends::camera::BackendError;
use crate::constants::messages;

/// Result type alias using ScanError
pub type ScanResult<T> = Result<T, ScanError>;

/// Failures surfaced to the user of the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The host or the user refused camera access
    PermissionDenied,
    /// Every acquisition fallback failed (including "no cameras at all")
    DeviceUnavailable,
    /// The decode engine found no symbol in a still image
    DecodeNotFound {
        /// Message shown to the user; differs between uploads and frozen frames
        message: String,
    },
    /// An unsupported container could not be converted for the decode engine
    TranscodeFailure(String),
    /// The input is not an image the pipeline can identify or read
    UnsupportedImage(String),
    /// Input is disabled (a dependent operation is loading, or the camera is busy)
    InputDisabled,
}

impl ScanError {
    /// Not-found on an uploaded image
    pub fn not_found_in_upload() -> Self {
        ScanError::DecodeNotFound {
            message: messages::NOT_FOUND_IN_IMAGE.to_string(),
        }
    }

    /// Not-found on a frame frozen by `pause()`
    pub fn not_found_in_capture() -> Self {
        ScanError::DecodeNotFound {
            message: messages::NOT_FOUND_IN_CAPTURE.to_string(),
        }
    }

    /// Whether the user can simply try again (new image, resume, or `start()`)
    ///
    /// Nothing in this crate is fatal to the host process, so this only
    /// distinguishes "try the same thing again" from "change something first".
    pub fn is_retryable(&self) -> bool {
        match self {
            ScanError::DecodeNotFound { .. }
            | ScanError::TranscodeFailure(_)
            | ScanError::InputDisabled => true,
            ScanError::PermissionDenied
            | ScanError::DeviceUnavailable
            | ScanError::UnsupportedImage(_) => false,
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::PermissionDenied => write!(f, "{}", messages::PERMISSION_DENIED),
            ScanError::DeviceUnavailable => write!(f, "{}", messages::DEVICE_UNAVAILABLE),
            ScanError::DecodeNotFound { message } => write!(f, "{}", message),
            ScanError::TranscodeFailure(msg) => {
                write!(f, "Could not convert the image for scanning: {}", msg)
            }
            ScanError::UnsupportedImage(msg) => write!(f, "Unsupported image: {}", msg),
            ScanError::InputDisabled => write!(f, "{}", messages::INPUT_DISABLED),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<BackendError> for ScanError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PermissionDenied(_) => ScanError::PermissionDenied,
            _ => ScanError::DeviceUnavailable,
        }
    }
}
