// SPDX-License-Identifier: GPL-3.0-only

//! Per-session resources
//!
//! A [`CaptureSession`] exclusively owns the camera stream, the poll loop
//! handle and the frozen frame. All of them are released together, exactly
//! once, by [`CaptureSession::dispose`] or by dropping the session.

use super::poll_loop::PollHandle;
use crate::backends::camera::{CameraFrame, CaptureStream};
use crate::decode::FrozenFrame;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Held for the duration of every decode against one session
pub type DecodeGate = Arc<tokio::sync::Mutex<()>>;

pub struct CaptureSession {
    id: Uuid,
    stream: Option<Box<dyn CaptureStream>>,
    poll: Option<PollHandle>,
    /// A cancelled loop may still be awaiting its decode; live ticks and the
    /// frozen-frame decode queue on this so they never overlap
    decode_gate: DecodeGate,
    frozen: Option<FrozenFrame>,
    /// Bumped on every freeze so a decode of an earlier frozen frame can
    /// tell it is stale
    freeze_seq: u64,
}

impl CaptureSession {
    pub fn new(id: Uuid, stream: Box<dyn CaptureStream>) -> Self {
        debug!(session = %id, device = stream.device_id(), "Capture session created");
        Self {
            id,
            stream: Some(stream),
            poll: None,
            decode_gate: Arc::new(tokio::sync::Mutex::new(())),
            frozen: None,
            freeze_seq: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_id(&self) -> Option<&str> {
        self.stream.as_ref().map(|s| s.device_id())
    }

    pub fn latest_frame(&self) -> Option<CameraFrame> {
        self.stream.as_ref().and_then(|s| s.latest_frame())
    }

    pub fn decode_gate(&self) -> DecodeGate {
        Arc::clone(&self.decode_gate)
    }

    /// Install a new poll loop, cancelling any previous one
    pub fn set_poll(&mut self, poll: PollHandle) {
        self.cancel_poll();
        self.poll = Some(poll);
    }

    pub fn cancel_poll(&mut self) {
        if let Some(mut poll) = self.poll.take() {
            poll.cancel();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(|p| !p.is_stopped())
    }

    /// Store a frozen frame and return its sequence number
    pub fn freeze(&mut self, frame: FrozenFrame) -> u64 {
        self.freeze_seq += 1;
        self.frozen = Some(frame);
        self.freeze_seq
    }

    pub fn thaw(&mut self) {
        self.frozen = None;
    }

    pub fn frozen(&self) -> Option<&FrozenFrame> {
        self.frozen.as_ref()
    }

    pub fn freeze_seq(&self) -> u64 {
        self.freeze_seq
    }

    /// Release every owned resource; later calls do nothing
    fn release(&mut self) {
        self.cancel_poll();
        self.frozen = None;
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            info!(session = %self.id, device = stream.device_id(), "Camera stream released");
        }
    }

    /// Tear the session down
    pub fn dispose(mut self) {
        self.release();
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("device", &self.device_id())
            .field("polling", &self.is_polling())
            .field("frozen", &self.frozen.is_some())
            .field("freeze_seq", &self.freeze_seq)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStream {
        stops: Arc<AtomicUsize>,
        stopped: bool,
    }

    impl CaptureStream for CountingStream {
        fn latest_frame(&self) -> Option<CameraFrame> {
            Some(CameraFrame::from_rgba(1, 1, vec![0u8; 4]))
        }

        fn stop(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.stops.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn device_id(&self) -> &str {
            "cam0"
        }
    }

    fn session(stops: &Arc<AtomicUsize>) -> CaptureSession {
        CaptureSession::new(
            Uuid::new_v4(),
            Box::new(CountingStream {
                stops: Arc::clone(stops),
                stopped: false,
            }),
        )
    }

    #[test]
    fn test_dispose_stops_stream_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        session(&stops).dispose();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_stream() {
        let stops = Arc::new(AtomicUsize::new(0));
        {
            let s = session(&stops);
            assert_eq!(s.device_id(), Some("cam0"));
        }
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_freeze_sequence() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut s = session(&stops);
        let frame = s.latest_frame().unwrap();
        let first = s.freeze(FrozenFrame::capture(&frame).unwrap());
        s.thaw();
        assert!(s.frozen().is_none());
        let second = s.freeze(FrozenFrame::capture(&frame).unwrap());
        assert!(second > first);
        assert_eq!(s.freeze_seq(), second);
    }

    #[tokio::test]
    async fn test_decode_gate_is_shared() {
        let stops = Arc::new(AtomicUsize::new(0));
        let s = session(&stops);
        let held = s.decode_gate();
        let _guard = held.lock().await;
        assert!(s.decode_gate().try_lock().is_err());
    }
}
