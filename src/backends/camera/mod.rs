// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Scanner (session)  │  ← State machine, poll loop
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ MediaDeviceProvider │  ← enumerate / acquire
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    CaptureStream    │  ← latest frame, stop
//! └──────────┬──────────┘
//!            │
//!            ▼
//!        ┌──────┐
//!        │ V4L2 │  ← Concrete implementation
//!        └──────┘
//! ```

pub mod enumeration;
pub mod format_converters;
pub mod types;
pub mod v4l2;

pub use enumeration::list_devices;
pub use types::*;
pub use v4l2::V4l2Provider;

use futures::future::BoxFuture;

/// Source of camera devices and streams
///
/// Both operations are suspension points for the scanner. Neither is ever
/// cancelled preemptively: the scanner re-checks its own state when they
/// complete and releases anything that arrived too late.
pub trait MediaDeviceProvider: Send + Sync {
    /// List every media device the host knows about, cameras or not
    fn enumerate(&self) -> BoxFuture<'_, BackendResult<Vec<MediaDeviceInfo>>>;

    /// Open a stream satisfying `constraints`
    ///
    /// May wait indefinitely on a permission prompt.
    fn acquire(&self, constraints: Constraints)
    -> BoxFuture<'_, BackendResult<Box<dyn CaptureStream>>>;
}

/// An open camera stream
///
/// Holding one of these holds the hardware. [`CaptureStream::stop`] must
/// release it synchronously and be safe to call more than once.
pub trait CaptureStream: Send + Sync {
    /// The most recent frame, or `None` until the first one arrives
    fn latest_frame(&self) -> Option<CameraFrame>;

    /// Stop all underlying tracks and release the device
    fn stop(&mut self);

    /// Id of the device actually opened
    fn device_id(&self) -> &str;
}
