// SPDX-License-Identifier: GPL-3.0-only

//! Delivery of decoded values to the caller

use crate::decode::DecodedResult;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

/// Callback invoked with every decoded value
pub type ScanCallback = Arc<dyn Fn(DecodedResult) + Send + Sync>;

/// The `on_scan` contract
///
/// Camera results are delivered at most once per session id. Uploads and
/// manual entry have no session and go through [`ResultSink::deliver`].
#[derive(Clone)]
pub struct ResultSink {
    callback: ScanCallback,
    last_session: Arc<Mutex<Option<Uuid>>>,
}

impl ResultSink {
    pub fn new(callback: ScanCallback) -> Self {
        Self {
            callback,
            last_session: Arc::new(Mutex::new(None)),
        }
    }

    /// A sink that only logs what it receives
    pub fn logging() -> Self {
        Self::new(Arc::new(|result: DecodedResult| {
            info!(text = %result.text, symbology = %result.symbology, "Scan result (no handler)");
        }))
    }

    /// Deliver the result of a camera session
    ///
    /// Returns `false` (and calls nothing) if this session already delivered.
    pub fn deliver_session(&self, session: Uuid, result: DecodedResult) -> bool {
        {
            let mut last = self
                .last_session
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *last == Some(session) {
                debug!(session = %session, "Session already delivered, dropping result");
                return false;
            }
            *last = Some(session);
        }
        info!(session = %session, text = %result.text, "Delivering scan result");
        (self.callback)(result);
        true
    }

    /// Deliver a result that did not come from a camera session
    pub fn deliver(&self, result: DecodedResult) {
        info!(text = %result.text, "Delivering scan result");
        (self.callback)(result);
    }
}

impl std::fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_sink() -> (ResultSink, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = ResultSink::new(Arc::new(move |r: DecodedResult| {
            seen_clone.lock().unwrap().push(r.text);
        }));
        (sink, seen)
    }

    #[test]
    fn test_once_per_session() {
        let (sink, seen) = recording_sink();
        let session = Uuid::new_v4();
        assert!(sink.deliver_session(session, DecodedResult::new("a", "QR")));
        assert!(!sink.deliver_session(session, DecodedResult::new("b", "QR")));
        assert!(sink.deliver_session(Uuid::new_v4(), DecodedResult::new("c", "QR")));
        assert_eq!(*seen.lock().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_sessionless_delivery() {
        let (sink, seen) = recording_sink();
        sink.deliver(DecodedResult::new("upload", "QR"));
        sink.deliver(DecodedResult::new("manual", "manual"));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
