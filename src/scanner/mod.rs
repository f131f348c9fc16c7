// SPDX-License-Identifier: GPL-3.0-only

//! Capture session manager
//!
//! [`Scanner`] owns the camera session state machine:
//!
//! ```text
//!            start()                 acquired
//!   Idle ───────────► Initializing ───────────► Scanning ◄──┐
//!    ▲                     │                    │    ▲      │ resume()
//!    │                     │ all tiers failed   │    │      │
//!    │                     ▼          pause()   ▼    │      │
//!    │                   Error               Paused ─┘──────┘
//!    │                                          │
//!    └──────────── stop() / result delivered ───┘
//! ```
//!
//! Every async continuation (acquisition, live decode, frozen decode)
//! re-checks the session it was started for before touching state, and
//! quietly drops its result if that session has moved on.
//!
//! Decodes against one session run one at a time, and a session's stream is
//! closed after the state lock is released but before any new acquisition.

pub mod poll_loop;
pub mod result_sink;
pub mod session;

pub use poll_loop::{LoopAction, PollHandle, StopSignal};
pub use result_sink::{ResultSink, ScanCallback};
pub use session::{CaptureSession, DecodeGate};

use crate::backends::camera::{
    CameraFrame, CaptureDevice, Constraints, MediaDeviceProvider, list_devices,
};
use crate::config::ScannerConfig;
use crate::decode::{
    DecodeEngine, DecodeOutcome, DecodeSource, DecodedResult, FrozenFrame, ImageCodecBridge,
    RasterBridge, StillImage, StillImagePipeline,
};
use crate::errors::{ScanError, ScanResult};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Camera session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Initializing,
    Scanning,
    Paused,
    Error,
}

impl SessionState {
    /// Whether a camera session exists or is being set up
    pub fn is_camera_active(&self) -> bool {
        matches!(
            self,
            SessionState::Initializing | SessionState::Scanning | SessionState::Paused
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Initializing => "Initializing",
            SessionState::Scanning => "Scanning",
            SessionState::Paused => "Paused",
            SessionState::Error => "Error",
        };
        write!(f, "{}", name)
    }
}

/// Mutable scanner state, guarded by one mutex
#[derive(Debug, Default)]
struct ScannerState {
    state: SessionState,
    devices: Vec<CaptureDevice>,
    active_device_index: Option<usize>,
    /// Id reserved for the session currently being acquired
    pending: Option<Uuid>,
    session: Option<CaptureSession>,
    scan_error: Option<String>,
    is_loading: bool,
}

impl ScannerState {
    fn is_pending(&self, id: Uuid) -> bool {
        self.state == SessionState::Initializing && self.pending == Some(id)
    }

    fn is_scanning(&self, id: Uuid) -> bool {
        self.state == SessionState::Scanning && self.session.as_ref().is_some_and(|s| s.id() == id)
    }

    fn is_frozen(&self, id: Uuid, seq: u64) -> bool {
        self.state == SessionState::Paused
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.id() == id && s.freeze_seq() == seq)
    }

    /// Return to `Idle`, handing back the session for disposal
    fn reset(&mut self) -> (Option<CaptureSession>, SessionState) {
        self.pending = None;
        self.scan_error = None;
        let previous = std::mem::replace(&mut self.state, SessionState::Idle);
        (self.session.take(), previous)
    }

    /// Replace the device list, keeping the selection on the same device
    /// where possible
    fn adopt_devices(
        &mut self,
        devices: Vec<CaptureDevice>,
        requested: Option<&str>,
        preferred: Option<&str>,
    ) {
        let previous = self.active_device().map(|d| d.id.clone());
        let wanted = requested.or(previous.as_deref()).or(preferred);

        self.active_device_index = wanted
            .and_then(|id| devices.iter().position(|d| d.id == id))
            .or(if devices.is_empty() { None } else { Some(0) });
        self.devices = devices;
    }

    fn active_device(&self) -> Option<&CaptureDevice> {
        self.active_device_index.and_then(|i| self.devices.get(i))
    }
}

struct Shared {
    state: Mutex<ScannerState>,
    /// Serialises acquisitions: a stale acquisition releases its stream
    /// before a newer one may ask for another
    acquire_gate: tokio::sync::Mutex<()>,
    /// Held while a detached session is being disposed. Always taken before
    /// `state`.
    teardown: Mutex<()>,
    provider: Arc<dyn MediaDeviceProvider>,
    engine: Arc<dyn DecodeEngine>,
    pipeline: StillImagePipeline,
    sink: ResultSink,
    config: ScannerConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ScannerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Detach a session under the state lock, then close it without the lock
    ///
    /// Stopping a stream can block on its capture thread; other callers keep
    /// access to the state meanwhile. Acquisitions wait on `teardown` instead.
    fn detach_and_dispose<R>(
        &self,
        detach: impl FnOnce(&mut ScannerState) -> (Option<CaptureSession>, R),
    ) -> R {
        let _teardown = self.teardown.lock().unwrap_or_else(PoisonError::into_inner);
        let mut st = self.lock();
        let (session, out) = detach(&mut *st);
        drop(st);
        if let Some(session) = session {
            session.dispose();
        }
        out
    }

    /// Block until no detached session is still closing its stream
    fn wait_for_teardown(&self) {
        drop(self.teardown.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Enumerate, then try exact device, environment-facing, any camera
    async fn acquire_and_run(self: &Arc<Self>, id: Uuid, requested: Option<String>) {
        let _gate = self.acquire_gate.lock().await;
        let pending = self.lock().is_pending(id);
        if !pending {
            debug!(session = %id, "Acquisition superseded before it began");
            return;
        }

        let devices = list_devices(self.provider.as_ref()).await;
        let exact = {
            let mut st = self.lock();
            if !st.is_pending(id) {
                debug!(session = %id, "Acquisition superseded during enumeration");
                return;
            }
            st.adopt_devices(
                devices,
                requested.as_deref(),
                self.config.preferred_device_id.as_deref(),
            );
            st.active_device().map(|d| d.id.clone())
        };

        let mut tiers = Vec::with_capacity(3);
        if let Some(device_id) = exact {
            tiers.push(Constraints::ExactDevice(device_id));
        }
        tiers.push(Constraints::EnvironmentFacing);
        tiers.push(Constraints::Any);

        // A stop() racing this start may still be closing the previous stream
        self.wait_for_teardown();

        let mut denied = false;
        let mut acquired = None;
        for constraints in tiers {
            let pending = self.lock().is_pending(id);
            if !pending {
                debug!(session = %id, "Acquisition superseded between tiers");
                return;
            }
            info!(session = %id, constraints = %constraints, "Requesting camera");
            match self.provider.acquire(constraints.clone()).await {
                Ok(stream) => {
                    acquired = Some(stream);
                    break;
                }
                Err(e) => {
                    warn!(constraints = %constraints, error = %e, "Camera request failed");
                    denied |= e.is_permission_denied();
                }
            }
        }

        let Some(mut stream) = acquired else {
            let error = if denied {
                ScanError::PermissionDenied
            } else {
                ScanError::DeviceUnavailable
            };
            let mut st = self.lock();
            if st.is_pending(id) {
                warn!(session = %id, error = %error, "Camera acquisition failed");
                st.pending = None;
                st.state = SessionState::Error;
                st.scan_error = Some(error.to_string());
            }
            return;
        };

        let mut st = self.lock();
        if !st.is_pending(id) {
            drop(st);
            stream.stop();
            info!(session = %id, device = stream.device_id(), "Released stream that arrived after stop");
            return;
        }

        if let Some(index) = st.devices.iter().position(|d| d.id == stream.device_id()) {
            st.active_device_index = Some(index);
        }
        info!(
            session = %id,
            device = stream.device_id(),
            index = ?st.active_device_index,
            "Camera acquired, scanning"
        );
        st.pending = None;
        st.session = Some(CaptureSession::new(id, stream));
        st.state = SessionState::Scanning;
        st.scan_error = None;
        self.start_polling(&mut st);
    }

    /// Start the live decode loop for the current session
    ///
    /// Shared by `start` and `resume`.
    fn start_polling(self: &Arc<Self>, st: &mut ScannerState) {
        let Some(session) = st.session.as_mut() else {
            return;
        };
        let session_id = session.id();
        let for_predicate: Weak<Shared> = Arc::downgrade(self);
        let for_tick = for_predicate.clone();

        let poll = PollHandle::spawn(
            "live-decode",
            self.config.poll_interval(),
            move || {
                for_predicate
                    .upgrade()
                    .is_some_and(|shared| shared.lock().is_scanning(session_id))
            },
            move |signal| {
                let shared = for_tick.upgrade();
                async move {
                    match shared {
                        Some(shared) => shared.poll_tick(session_id, &signal).await,
                        None => LoopAction::Stop,
                    }
                }
            },
        );
        session.set_poll(poll);
    }

    /// One live decode attempt
    async fn poll_tick(&self, session_id: Uuid, signal: &StopSignal) -> LoopAction {
        let gate = {
            let st = self.lock();
            match st.session.as_ref() {
                Some(session) if st.is_scanning(session_id) => session.decode_gate(),
                _ => return LoopAction::Stop,
            }
        };
        // Waits out a decode left over from a cancelled loop or a frozen frame
        let _decoding = gate.lock().await;

        let frame = {
            let st = self.lock();
            if signal.is_stopped() || !st.is_scanning(session_id) {
                return LoopAction::Stop;
            }
            st.session.as_ref().and_then(|s| s.latest_frame())
        };
        let Some(frame) = frame else {
            trace!(session = %session_id, "No live frame yet");
            return LoopAction::Continue;
        };

        let outcome = self.engine.decode(DecodeSource::Frame(frame)).await;

        match outcome {
            DecodeOutcome::Found(result) => {
                let delivered = self.finish_with_result(result, |st| {
                    !signal.is_stopped() && st.is_scanning(session_id)
                });
                if !delivered {
                    debug!(session = %session_id, "Discarding decode from a stopped loop");
                }
                LoopAction::Stop
            }
            _ if signal.is_stopped() => {
                debug!(session = %session_id, "Discarding decode from a stopped loop");
                LoopAction::Stop
            }
            DecodeOutcome::NotFound => LoopAction::Continue,
            DecodeOutcome::Failed(reason) => {
                debug!(session = %session_id, %reason, "Live frame could not be decoded");
                LoopAction::Continue
            }
        }
    }

    /// Tear down the session, then deliver
    ///
    /// `is_current` is evaluated under the lock; if it fails nothing changes.
    fn finish_with_result(
        &self,
        result: DecodedResult,
        is_current: impl FnOnce(&ScannerState) -> bool,
    ) -> bool {
        let session_id = self.detach_and_dispose(|st| {
            if !is_current(&*st) {
                return (None, None);
            }
            let session = st.session.take();
            let id = session.as_ref().map(CaptureSession::id);
            if id.is_some() {
                st.state = SessionState::Idle;
                st.scan_error = None;
            }
            (session, id)
        });
        let Some(session_id) = session_id else {
            return false;
        };
        info!(session = %session_id, "Barcode found, session closed");
        self.sink.deliver_session(session_id, result)
    }
}

/// Builder for [`Scanner`]
pub struct ScannerBuilder {
    provider: Arc<dyn MediaDeviceProvider>,
    engine: Arc<dyn DecodeEngine>,
    bridge: Arc<dyn ImageCodecBridge>,
    sink: ResultSink,
    config: ScannerConfig,
}

impl ScannerBuilder {
    /// Image codec used for containers the engine cannot read
    pub fn bridge(mut self, bridge: Arc<dyn ImageCodecBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn config(mut self, config: ScannerConfig) -> Self {
        self.config = config;
        self
    }

    /// Callback fired with each decoded value
    pub fn on_scan<F>(mut self, callback: F) -> Self
    where
        F: Fn(DecodedResult) + Send + Sync + 'static,
    {
        self.sink = ResultSink::new(Arc::new(callback));
        self
    }

    pub fn build(self) -> Scanner {
        let pipeline = StillImagePipeline::new(Arc::clone(&self.engine), self.bridge);
        Scanner {
            shared: Arc::new(Shared {
                state: Mutex::new(ScannerState::default()),
                acquire_gate: tokio::sync::Mutex::new(()),
                teardown: Mutex::new(()),
                provider: self.provider,
                engine: self.engine,
                pipeline,
                sink: self.sink,
                config: self.config,
            }),
        }
    }
}

/// Barcode scanner over one camera at a time
///
/// Cheap to clone; all clones drive the same session. Dropping the last
/// clone releases the camera. Methods that start polling (`start`,
/// `switch_camera`, `resume`) must be called from within a tokio runtime.
///
/// None of the session operations return errors. Failures are reported
/// through [`Scanner::scan_error`] and [`Scanner::state`].
#[derive(Clone)]
pub struct Scanner {
    shared: Arc<Shared>,
}

impl Scanner {
    pub fn builder(
        provider: Arc<dyn MediaDeviceProvider>,
        engine: Arc<dyn DecodeEngine>,
    ) -> ScannerBuilder {
        ScannerBuilder {
            provider,
            engine,
            bridge: Arc::new(RasterBridge),
            sink: ResultSink::logging(),
            config: ScannerConfig::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScannerState> {
        self.shared.lock()
    }

    /// Open a camera and start scanning
    ///
    /// Accepted from `Idle`, or from `Error` as a retry. Resolves once the
    /// acquisition has succeeded or failed; a `stop()` in the meantime makes
    /// the acquisition release whatever it obtains.
    pub async fn start(&self) {
        let id = {
            let mut st = self.lock();
            if st.is_loading {
                debug!("Input is loading, start ignored");
                return;
            }
            if !matches!(st.state, SessionState::Idle | SessionState::Error) {
                debug!(state = %st.state, "start ignored");
                return;
            }
            let id = Uuid::new_v4();
            st.state = SessionState::Initializing;
            st.pending = Some(id);
            st.scan_error = None;
            id
        };
        info!(session = %id, "Starting scanner");
        self.shared.acquire_and_run(id, None).await;
    }

    /// Move to the next enumerated camera
    pub async fn switch_camera(&self) {
        // The old stream is fully released before the new request is made
        let switch = self.shared.detach_and_dispose(|st| {
            let count = st.devices.len();
            if st.state != SessionState::Scanning || count < 2 {
                debug!(state = %st.state, devices = count, "switch_camera ignored");
                return (None, None);
            }
            let next = st.active_device_index.map_or(0, |i| (i + 1) % count);
            let next_id = st.devices[next].id.clone();

            let id = Uuid::new_v4();
            st.state = SessionState::Initializing;
            st.pending = Some(id);
            st.scan_error = None;
            (st.session.take(), Some((id, next_id)))
        });
        let Some((id, next)) = switch else {
            return;
        };
        info!(session = %id, device = %next, "Switching camera");
        self.shared.acquire_and_run(id, Some(next)).await;
    }

    /// Freeze the current frame and decode it once
    ///
    /// Refused (scanning continues) if no live frame has arrived yet.
    pub async fn pause(&self) {
        let (session_id, seq, frozen, gate) = {
            let mut st = self.lock();
            if st.state != SessionState::Scanning {
                debug!(state = %st.state, "pause ignored");
                return;
            }
            let Some(session) = st.session.as_mut() else {
                return;
            };
            let Some(frozen) = session.latest_frame().as_ref().and_then(FrozenFrame::capture)
            else {
                info!(session = %session.id(), "No frame to freeze yet, still scanning");
                return;
            };
            session.cancel_poll();
            let seq = session.freeze(frozen.clone());
            let id = session.id();
            let gate = session.decode_gate();
            st.state = SessionState::Paused;
            st.scan_error = None;
            (id, seq, frozen, gate)
        };
        info!(
            session = %session_id,
            width = frozen.width,
            height = frozen.height,
            "Paused, decoding frozen frame"
        );

        // The cancelled loop may still be decoding a live frame
        let _decoding = gate.lock().await;
        let still_frozen = self.lock().is_frozen(session_id, seq);
        if !still_frozen {
            debug!(session = %session_id, "Frozen frame released before its decode started");
            return;
        }

        let outcome = self
            .shared
            .pipeline
            .decode(StillImage::Frozen(frozen))
            .await;

        match outcome {
            Ok(result) => {
                if !self
                    .shared
                    .finish_with_result(result, |st| st.is_frozen(session_id, seq))
                {
                    debug!(session = %session_id, "Discarding decode of a stale frozen frame");
                }
            }
            Err(error) => {
                let mut st = self.lock();
                if st.is_frozen(session_id, seq) {
                    info!(session = %session_id, error = %error, "Frozen frame decode failed");
                    st.scan_error = Some(error.to_string());
                }
            }
        }
    }

    /// Drop the frozen frame and go back to live scanning
    pub fn resume(&self) {
        let mut st = self.lock();
        if st.state != SessionState::Paused {
            debug!(state = %st.state, "resume ignored");
            return;
        }
        if let Some(session) = st.session.as_mut() {
            session.thaw();
            info!(session = %session.id(), "Resuming live scanning");
        }
        st.state = SessionState::Scanning;
        st.scan_error = None;
        self.shared.start_polling(&mut st);
    }

    /// Release the camera and return to `Idle`; safe to call any time
    pub fn stop(&self) {
        let previous = self.shared.detach_and_dispose(ScannerState::reset);
        if previous != SessionState::Idle {
            info!(from = %previous, "Scanner stopped");
        }
    }

    /// Decode an uploaded image
    ///
    /// Refused while loading or while a camera session is active. The error
    /// message is also mirrored into [`Scanner::scan_error`].
    pub async fn scan_image(
        &self,
        bytes: Vec<u8>,
        name: Option<String>,
    ) -> ScanResult<DecodedResult> {
        {
            let mut st = self.lock();
            if st.is_loading || st.state.is_camera_active() {
                debug!(loading = st.is_loading, state = %st.state, "Upload refused");
                return Err(ScanError::InputDisabled);
            }
            st.scan_error = None;
        }

        info!(name = ?name, bytes = bytes.len(), "Decoding uploaded image");
        match self
            .shared
            .pipeline
            .decode(StillImage::Upload { bytes, name })
            .await
        {
            Ok(result) => {
                self.shared.sink.deliver(result.clone());
                Ok(result)
            }
            Err(error) => {
                info!(error = %error, "Upload decode failed");
                self.lock().scan_error = Some(error.to_string());
                Err(error)
            }
        }
    }

    /// Deliver a manually typed code
    ///
    /// Returns `false` if the input is empty or input is currently disabled.
    pub fn submit_manual(&self, input: &str) -> bool {
        let text = input.trim();
        {
            let st = self.lock();
            if text.is_empty() || st.is_loading || st.state.is_camera_active() {
                debug!(loading = st.is_loading, state = %st.state, "Manual entry refused");
                return false;
            }
        }
        self.shared.sink.deliver(DecodedResult::new(text, "manual"));
        true
    }

    /// Re-enumerate cameras without opening one
    pub async fn refresh_devices(&self) -> Vec<CaptureDevice> {
        let devices = list_devices(self.shared.provider.as_ref()).await;
        let mut st = self.lock();
        st.adopt_devices(devices, None, self.shared.config.preferred_device_id.as_deref());
        st.devices.clone()
    }

    pub fn set_loading(&self, loading: bool) {
        self.lock().is_loading = loading;
    }

    pub fn is_loading(&self) -> bool {
        self.lock().is_loading
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// User-facing description of the current failure
    pub fn scan_error(&self) -> Option<String> {
        self.lock().scan_error.clone()
    }

    pub fn devices(&self) -> Vec<CaptureDevice> {
        self.lock().devices.clone()
    }

    pub fn active_device_index(&self) -> Option<usize> {
        self.lock().active_device_index
    }

    pub fn active_device(&self) -> Option<CaptureDevice> {
        self.lock().active_device().cloned()
    }

    pub fn can_switch_camera(&self) -> bool {
        let st = self.lock();
        st.state == SessionState::Scanning && st.devices.len() > 1
    }

    pub fn frozen_frame(&self) -> Option<FrozenFrame> {
        self.lock()
            .session
            .as_ref()
            .and_then(|s| s.frozen().cloned())
    }

    /// Latest live frame of the open stream
    pub fn preview_frame(&self) -> Option<CameraFrame> {
        self.lock().session.as_ref().and_then(|s| s.latest_frame())
    }

    /// Whether a live decode loop is scheduled
    pub fn is_polling(&self) -> bool {
        self.lock().session.as_ref().is_some_and(|s| s.is_polling())
    }
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.lock();
        f.debug_struct("Scanner")
            .field("state", &st.state)
            .field("active_device_index", &st.active_device_index)
            .field("session", &st.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::FacingMode;

    fn device(id: &str) -> CaptureDevice {
        CaptureDevice {
            id: id.to_string(),
            label: id.to_uppercase(),
            facing: FacingMode::Unknown,
        }
    }

    #[test]
    fn test_adopt_devices_defaults_to_first() {
        let mut st = ScannerState::default();
        st.adopt_devices(vec![device("a"), device("b")], None, None);
        assert_eq!(st.active_device_index, Some(0));
    }

    #[test]
    fn test_adopt_devices_empty_list() {
        let mut st = ScannerState::default();
        st.adopt_devices(vec![device("a")], None, None);
        st.adopt_devices(Vec::new(), None, None);
        assert_eq!(st.active_device_index, None);
        assert!(st.active_device().is_none());
    }

    #[test]
    fn test_adopt_devices_follows_device_across_reorder() {
        let mut st = ScannerState::default();
        st.adopt_devices(vec![device("a"), device("b")], Some("b"), None);
        assert_eq!(st.active_device_index, Some(1));
        st.adopt_devices(vec![device("b"), device("c"), device("a")], None, None);
        assert_eq!(st.active_device_index, Some(0));
    }

    #[test]
    fn test_adopt_devices_preferred() {
        let mut st = ScannerState::default();
        st.adopt_devices(vec![device("a"), device("b")], None, Some("b"));
        assert_eq!(st.active_device_index, Some(1));
        st.adopt_devices(vec![device("a")], None, Some("missing"));
        assert_eq!(st.active_device_index, Some(0));
    }

    #[test]
    fn test_reset_returns_previous_state() {
        let mut st = ScannerState {
            state: SessionState::Error,
            scan_error: Some("boom".to_string()),
            ..Default::default()
        };
        let (session, previous) = st.reset();
        assert!(session.is_none());
        assert_eq!(previous, SessionState::Error);
        assert_eq!(st.state, SessionState::Idle);
        assert!(st.scan_error.is_none());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Initializing.to_string(), "Initializing");
        assert!(SessionState::Paused.is_camera_active());
        assert!(!SessionState::Error.is_camera_active());
    }
}
