// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use crate::constants::{ENVIRONMENT_FACING_HINTS, USER_FACING_HINTS};
use std::sync::Arc;
use std::time::Instant;

/// Kind of a media device reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Camera-class capture device
    VideoInput,
    /// Microphone
    AudioInput,
    /// Anything else the host reports (metadata nodes, codecs, speakers)
    Other,
}

/// Which way a camera points, when the host knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FacingMode {
    /// Rear camera, pointing away from the user
    Environment,
    /// Front camera, pointing at the user
    User,
    #[default]
    Unknown,
}

impl FacingMode {
    /// Guess the facing mode from a device label
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        if ENVIRONMENT_FACING_HINTS.iter().any(|h| label.contains(h)) {
            FacingMode::Environment
        } else if USER_FACING_HINTS.iter().any(|h| label.contains(h)) {
            FacingMode::User
        } else {
            FacingMode::Unknown
        }
    }
}

impl std::fmt::Display for FacingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FacingMode::Environment => write!(f, "environment"),
            FacingMode::User => write!(f, "user"),
            FacingMode::Unknown => write!(f, "unknown"),
        }
    }
}

/// Raw device entry as the provider enumerates it, before filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDeviceInfo {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
    pub facing: FacingMode,
}

/// A camera that can be requested by id
///
/// Immutable once enumerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    pub id: String,
    pub label: String,
    pub facing: FacingMode,
}

impl std::fmt::Display for CaptureDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label, self.id)
    }
}

/// What to ask the provider for when acquiring a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraints {
    /// Exactly this device; fail rather than substitute
    ExactDevice(String),
    /// Any rear-facing camera
    EnvironmentFacing,
    /// Whatever camera the host picks
    Any,
}

impl std::fmt::Display for Constraints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraints::ExactDevice(id) => write!(f, "device {}", id),
            Constraints::EnvironmentFacing => write!(f, "environment-facing camera"),
            Constraints::Any => write!(f, "any camera"),
        }
    }
}

/// Pixel format of a [`CameraFrame`]
///
/// Capture backends convert to one of these before handing frames out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    RGBA,
    /// Gray8 - 8-bit luma (1 byte per pixel)
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::RGBA => 4,
            Self::Gray8 => 1,
        }
    }
}

/// A single frame from the camera
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    pub format: PixelFormat,
    /// Row stride in bytes (may include padding)
    pub stride: u32,
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Wrap tightly packed RGBA pixels
    pub fn from_rgba(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            format: PixelFormat::RGBA,
            stride: width * 4,
            captured_at: Instant::now(),
        }
    }

    /// Check that the buffer is large enough for the declared geometry
    pub fn is_well_formed(&self) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        let row = self.width as usize * self.format.bytes_per_pixel() as usize;
        let stride = self.stride as usize;
        stride >= row && self.data.len() >= stride * (self.height as usize - 1) + row
    }

    /// Luma value of one pixel (BT.601 weights for RGBA)
    pub fn luma_at(&self, x: u32, y: u32) -> u8 {
        let bpp = self.format.bytes_per_pixel() as usize;
        let offset = y as usize * self.stride as usize + x as usize * bpp;
        match self.format {
            PixelFormat::Gray8 => self.data.get(offset).copied().unwrap_or(0),
            PixelFormat::RGBA => match self.data.get(offset..offset + 3) {
                Some(px) => {
                    let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
                    ((r * 299 + g * 587 + b * 114) / 1000) as u8
                }
                None => 0,
            },
        }
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The host refused access to the device
    PermissionDenied(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Device exists but another process holds it
    DeviceBusy(String),
    /// No device satisfies the requested constraints
    Overconstrained(String),
    /// Device opened but streaming could not start
    StreamFailed(String),
    /// Other errors
    Other(String),
}

impl BackendError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, BackendError::PermissionDenied(_))
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::DeviceBusy(msg) => write!(f, "Device busy: {}", msg),
            BackendError::Overconstrained(msg) => write!(f, "No device matches: {}", msg),
            BackendError::StreamFailed(msg) => write!(f, "Stream failed: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            return BackendError::PermissionDenied(err.to_string());
        }
        match err.raw_os_error() {
            Some(libc::EBUSY) => BackendError::DeviceBusy(err.to_string()),
            Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
                BackendError::DeviceNotFound(err.to_string())
            }
            _ => BackendError::Other(err.to_string()),
        }
    }
}
