// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera provider
//!
//! Enumerates `/dev/video*` nodes and streams from them with memory-mapped
//! buffers. Each open stream runs its own capture thread that keeps only the
//! latest frame, converted to RGBA; the scanner samples it at its own pace.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as _;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

use super::format_converters::{mjpeg_to_rgba, rgb_to_rgba, uyvy_to_rgba, yuyv_to_rgba};
use super::types::*;
use super::{CaptureStream, MediaDeviceProvider};
use crate::config::ScannerConfig;

/// Formats we can turn into RGBA, in order of preference
const PREFERRED_FOURCCS: [&[u8; 4]; 4] = [b"MJPG", b"YUYV", b"UYVY", b"RGB3"];

/// Consecutive dequeue failures before the device is considered gone
const MAX_CONSECUTIVE_ERRORS: u32 = 50;

/// Pause between retries after a failed dequeue
const ERROR_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Capture parameters requested from every device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub buffers: u32,
}

impl From<&ScannerConfig> for CaptureSettings {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            width: config.capture_width,
            height: config.capture_height,
            buffers: config.capture_buffers.max(1),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from(&ScannerConfig::default())
    }
}

/// Camera provider backed by Video4Linux2
#[derive(Debug, Clone, Default)]
pub struct V4l2Provider {
    settings: CaptureSettings,
}

impl V4l2Provider {
    pub fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }

    /// Open every video node; nodes that fail to open are skipped
    fn enumerate_blocking() -> BackendResult<Vec<MediaDeviceInfo>> {
        let mut devices = Vec::new();
        for path in video_nodes()? {
            match inspect_node(&path) {
                Ok(info) => devices.push(info),
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping video node"),
            }
        }
        Ok(devices)
    }

    /// Resolve constraints to a concrete device path
    fn resolve_blocking(constraints: &Constraints) -> BackendResult<String> {
        if let Constraints::ExactDevice(id) = constraints {
            // Open it so that a missing node or a metadata-only node is reported
            // before a capture thread is spawned
            let info = inspect_node(Path::new(id))?;
            if info.kind != DeviceKind::VideoInput {
                return Err(BackendError::Overconstrained(format!(
                    "{} is not a capture device",
                    id
                )));
            }
            return Ok(info.id);
        }

        let cameras: Vec<MediaDeviceInfo> = Self::enumerate_blocking()?
            .into_iter()
            .filter(|d| d.kind == DeviceKind::VideoInput)
            .collect();

        let chosen = match constraints {
            Constraints::EnvironmentFacing => cameras
                .into_iter()
                .find(|d| d.facing == FacingMode::Environment)
                .ok_or_else(|| BackendError::Overconstrained(constraints.to_string()))?,
            _ => cameras
                .into_iter()
                .next()
                .ok_or_else(|| BackendError::DeviceNotFound("No cameras found".to_string()))?,
        };
        Ok(chosen.id)
    }
}

impl MediaDeviceProvider for V4l2Provider {
    fn enumerate(&self) -> BoxFuture<'_, BackendResult<Vec<MediaDeviceInfo>>> {
        Box::pin(async move {
            tokio::task::spawn_blocking(Self::enumerate_blocking)
                .await
                .map_err(|e| BackendError::Other(format!("Enumeration task failed: {}", e)))?
        })
    }

    fn acquire(
        &self,
        constraints: Constraints,
    ) -> BoxFuture<'_, BackendResult<Box<dyn CaptureStream>>> {
        let settings = self.settings;
        Box::pin(async move {
            let path = tokio::task::spawn_blocking(move || Self::resolve_blocking(&constraints))
                .await
                .map_err(|e| BackendError::Other(format!("Device lookup failed: {}", e)))??;

            let stream = V4l2Stream::open(path, settings).await?;
            Ok(Box::new(stream) as Box<dyn CaptureStream>)
        })
    }
}

/// List `/dev/video*` nodes in numeric order
fn video_nodes() -> BackendResult<Vec<PathBuf>> {
    let mut nodes: Vec<(u32, PathBuf)> = std::fs::read_dir("/dev")?
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let index = name.to_str()?.strip_prefix("video")?.parse::<u32>().ok()?;
            Some((index, entry.path()))
        })
        .collect();
    nodes.sort_by_key(|(index, _)| *index);
    Ok(nodes.into_iter().map(|(_, path)| path).collect())
}

/// Query one node's capabilities
///
/// UVC cameras expose a second metadata node that also reports the capture
/// capability, so a node only counts as a camera if it lists capture formats.
fn inspect_node(path: &Path) -> BackendResult<MediaDeviceInfo> {
    let dev = Device::with_path(path)?;
    let caps = dev.query_caps()?;

    let has_formats = dev
        .enum_formats()
        .map(|formats| !formats.is_empty())
        .unwrap_or(false);
    let kind = if caps.capabilities.contains(Flags::VIDEO_CAPTURE) && has_formats {
        DeviceKind::VideoInput
    } else {
        DeviceKind::Other
    };

    Ok(MediaDeviceInfo {
        id: path.to_string_lossy().to_string(),
        facing: FacingMode::from_label(&caps.card),
        label: caps.card,
        kind,
    })
}

/// An open V4L2 stream with its capture thread
pub struct V4l2Stream {
    device_id: String,
    stop_signal: Arc<AtomicBool>,
    latest_frame: Arc<Mutex<Option<CameraFrame>>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl V4l2Stream {
    /// Spawn the capture thread and wait until streaming has started
    async fn open(path: String, settings: CaptureSettings) -> BackendResult<Self> {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let latest_frame = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread_handle = {
            let path = path.clone();
            let stop_signal = Arc::clone(&stop_signal);
            let latest_frame = Arc::clone(&latest_frame);
            thread::Builder::new()
                .name("v4l2-capture".to_string())
                .spawn(move || {
                    capture_thread(&path, settings, stop_signal, latest_frame, ready_tx)
                })?
        };

        let mut stream = Self {
            device_id: path,
            stop_signal,
            latest_frame,
            thread_handle: Some(thread_handle),
        };

        match ready_rx.await {
            Ok(Ok(())) => {
                info!(device = %stream.device_id, "V4L2 stream started");
                Ok(stream)
            }
            Ok(Err(e)) => {
                stream.stop();
                Err(e)
            }
            Err(_) => {
                stream.stop();
                Err(BackendError::StreamFailed(
                    "Capture thread exited before streaming".to_string(),
                ))
            }
        }
    }
}

impl CaptureStream for V4l2Stream {
    fn latest_frame(&self) -> Option<CameraFrame> {
        self.latest_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            debug!(device = %self.device_id, "Waiting for capture thread to finish");
            if handle.join().is_err() {
                warn!(device = %self.device_id, "Capture thread panicked");
            }
            info!(device = %self.device_id, "V4L2 stream stopped");
        }
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }
}

impl Drop for V4l2Stream {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(device = %self.device_id, "V4l2Stream dropped without stop, stopping");
            self.stop();
        }
    }
}

/// Try the preferred formats until the driver accepts one we can convert
fn negotiate_format(dev: &Device, settings: CaptureSettings) -> BackendResult<Format> {
    for fourcc in PREFERRED_FOURCCS {
        let requested = Format::new(settings.width, settings.height, FourCC::new(fourcc));
        match dev.set_format(&requested) {
            Ok(actual) if PREFERRED_FOURCCS.iter().any(|f| FourCC::new(f) == actual.fourcc) => {
                return Ok(actual);
            }
            Ok(actual) => {
                trace!(requested = ?requested.fourcc, actual = ?actual.fourcc, "Driver substituted format");
            }
            Err(e) => trace!(fourcc = ?requested.fourcc, error = %e, "Format rejected"),
        }
    }
    Err(BackendError::StreamFailed(
        "Device offers no MJPG, YUYV, UYVY or RGB3 format".to_string(),
    ))
}

/// Strip per-row padding from packed formats
fn packed_rows(buf: &[u8], width: u32, height: u32, bytes_per_pixel: u32, stride: u32) -> Vec<u8> {
    let row = (width * bytes_per_pixel) as usize;
    let stride = stride.max(width * bytes_per_pixel) as usize;
    if stride == row {
        return buf.to_vec();
    }
    let mut packed = Vec::with_capacity(row * height as usize);
    for chunk in buf.chunks(stride).take(height as usize) {
        packed.extend_from_slice(&chunk[..row.min(chunk.len())]);
    }
    packed
}

/// Convert one captured buffer to an RGBA frame
fn convert_frame(buf: &[u8], format: &Format) -> Option<CameraFrame> {
    let (width, height) = (format.width, format.height);
    let (width, height, rgba) = if format.fourcc == FourCC::new(b"MJPG") {
        match mjpeg_to_rgba(buf) {
            Ok(decoded) => decoded,
            Err(e) => {
                trace!(error = %e, "Dropping corrupt MJPEG frame");
                return None;
            }
        }
    } else if format.fourcc == FourCC::new(b"YUYV") {
        let packed = packed_rows(buf, width, height, 2, format.stride);
        (width, height, yuyv_to_rgba(&packed, width, height))
    } else if format.fourcc == FourCC::new(b"UYVY") {
        let packed = packed_rows(buf, width, height, 2, format.stride);
        (width, height, uyvy_to_rgba(&packed, width, height))
    } else {
        let packed = packed_rows(buf, width, height, 3, format.stride);
        (width, height, rgb_to_rgba(&packed))
    };

    let frame = CameraFrame::from_rgba(width, height, rgba);
    frame.is_well_formed().then_some(frame)
}

/// Run of failed dequeues since the last good buffer
#[derive(Debug, Default)]
struct ErrorStreak {
    count: u32,
}

impl ErrorStreak {
    /// Record a failure; `true` once the streak is long enough to give up
    fn fail(&mut self) -> bool {
        self.count += 1;
        self.count >= MAX_CONSECUTIVE_ERRORS
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    /// Only the first failure of a streak is worth a warning
    fn is_first(&self) -> bool {
        self.count == 1
    }
}

/// Capture loop running in a dedicated thread
///
/// Reports readiness (or the open error) through `ready` exactly once. If the
/// receiver is gone by then, nobody will ever stop this stream, so the thread
/// releases the device and exits. A device that keeps failing (unplugged,
/// driver reset) clears the latest frame and ends the thread.
fn capture_thread(
    path: &str,
    settings: CaptureSettings,
    stop_signal: Arc<AtomicBool>,
    latest_frame: Arc<Mutex<Option<CameraFrame>>>,
    ready: oneshot::Sender<BackendResult<()>>,
) {
    let dev = match Device::with_path(path) {
        Ok(dev) => dev,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };

    let format = match negotiate_format(&dev, settings) {
        Ok(format) => format,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    info!(
        path,
        width = format.width,
        height = format.height,
        fourcc = ?format.fourcc,
        "V4L2 format configured"
    );

    let mut stream = match Stream::with_buffers(&dev, Type::VideoCapture, settings.buffers) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(BackendError::from(e)));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        debug!(path, "Stream no longer wanted, releasing device");
        return;
    }

    let mut errors = ErrorStreak::default();
    while !stop_signal.load(Ordering::SeqCst) {
        let buf = match stream.next() {
            Ok((buf, _meta)) => buf,
            Err(e) => {
                let give_up = errors.fail();
                if errors.is_first() {
                    warn!(path, error = %e, "Failed to capture frame");
                } else {
                    trace!(path, error = %e, failures = errors.count, "Capture still failing");
                }
                if give_up {
                    error!(path, failures = errors.count, "Camera stopped delivering frames");
                    *latest_frame.lock().unwrap_or_else(PoisonError::into_inner) = None;
                    return;
                }
                thread::sleep(ERROR_RETRY_DELAY);
                continue;
            }
        };
        errors.reset();

        if let Some(frame) = convert_frame(buf, &format) {
            *latest_frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
        }
    }

    debug!(path, "Capture thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_rows_strips_padding() {
        // 2x2 YUYV with 2 bytes of padding per row
        let buf = [1u8, 2, 3, 4, 0, 0, 5, 6, 7, 8, 0, 0];
        assert_eq!(packed_rows(&buf, 2, 2, 2, 6), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(packed_rows(&buf[..8], 2, 2, 2, 4), buf[..8].to_vec());
    }

    #[test]
    fn test_error_streak_gives_up_after_limit() {
        let mut errors = ErrorStreak::default();
        assert!(!errors.fail());
        assert!(errors.is_first());
        for _ in 2..MAX_CONSECUTIVE_ERRORS {
            assert!(!errors.fail());
        }
        assert!(!errors.is_first());
        assert!(errors.fail());
    }

    #[test]
    fn test_error_streak_resets_on_frame() {
        let mut errors = ErrorStreak::default();
        for _ in 1..MAX_CONSECUTIVE_ERRORS {
            errors.fail();
        }
        errors.reset();
        assert!(!errors.fail());
        assert!(errors.is_first());
    }

    #[test]
    fn test_settings_from_config() {
        let config = ScannerConfig {
            capture_width: 1280,
            capture_height: 720,
            capture_buffers: 0,
            ..ScannerConfig::default()
        };
        let settings = CaptureSettings::from(&config);
        assert_eq!((settings.width, settings.height), (1280, 720));
        assert_eq!(settings.buffers, 1);
    }
}
