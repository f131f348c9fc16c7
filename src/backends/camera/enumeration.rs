// SPDX-License-Identifier: GPL-3.0-only

//! Camera enumeration
//!
//! Filters whatever the provider reports down to camera-class devices.

use super::MediaDeviceProvider;
use super::types::{CaptureDevice, DeviceKind};
use tracing::{debug, warn};

/// List the video-input devices the provider knows about, in provider order
///
/// Never fails: an enumeration error is logged and reported as an empty
/// list, which makes the scanner fall back to facing/unconstrained requests.
pub async fn list_devices(provider: &dyn MediaDeviceProvider) -> Vec<CaptureDevice> {
    let devices = match provider.enumerate().await {
        Ok(devices) => devices,
        Err(e) => {
            warn!(error = %e, "Failed to enumerate cameras");
            return Vec::new();
        }
    };

    let cameras: Vec<CaptureDevice> = devices
        .into_iter()
        .filter(|d| d.kind == DeviceKind::VideoInput)
        .map(|d| CaptureDevice {
            id: d.id,
            label: d.label,
            facing: d.facing,
        })
        .collect();

    debug!(count = cameras.len(), "Enumerated cameras");
    cameras
}
