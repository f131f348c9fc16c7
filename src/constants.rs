// SPDX-License-Identifier: GPL-3.0-only

//! Scanner-wide constants

use std::time::Duration;

/// Delay between two live-frame decode attempts
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Frames larger than this (either side) are downscaled before decoding
pub const MAX_DECODE_DIMENSION: u32 = 640;

/// Default capture resolution requested from camera devices
pub const DEFAULT_CAPTURE_WIDTH: u32 = 640;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 480;

/// Number of memory-mapped buffers per V4L2 stream
pub const DEFAULT_CAPTURE_BUFFERS: u32 = 4;

/// Directory name under the user's config dir
pub const CONFIG_DIR_NAME: &str = "gtin-scanner";

/// Config file name inside [`CONFIG_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Label fragments that mark a rear (environment-facing) camera
pub const ENVIRONMENT_FACING_HINTS: [&str; 4] = ["back", "rear", "world", "environment"];

/// Label fragments that mark a front (user-facing) camera
pub const USER_FACING_HINTS: [&str; 4] = ["front", "user", "selfie", "integrated"];

/// User-facing strings
pub mod messages {
    pub const PERMISSION_DENIED: &str = "Camera access denied. Please allow camera permissions.";
    pub const DEVICE_UNAVAILABLE: &str =
        "No camera could be opened. Check that a camera is connected and not in use.";
    pub const NOT_FOUND_IN_IMAGE: &str = "No barcode detected in image.";
    pub const NOT_FOUND_IN_CAPTURE: &str =
        "No barcode detected in captured image. Try resuming to capture again.";
    pub const INPUT_DISABLED: &str = "Input is disabled while another operation is in progress.";
}
