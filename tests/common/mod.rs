// SPDX-License-Identifier: GPL-3.0-only

//! Test doubles shared by the integration tests

#![allow(dead_code)]

use futures::future::BoxFuture;
use gtin_scanner::backends::camera::{
    BackendError, BackendResult, CameraFrame, CaptureStream, Constraints, DeviceKind, FacingMode,
    MediaDeviceInfo, MediaDeviceProvider,
};
use gtin_scanner::decode::{
    DecodeEngine, DecodeOutcome, DecodeSource, DecodedResult, ImageCodecBridge, ImageContainer,
    TranscodeError,
};
use gtin_scanner::{Scanner, ScannerConfig};
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Ordered record of what the fakes were asked to do
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Let spawned tasks run without advancing the clock
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Advance the (paused) clock and let tasks run
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    settle().await;
}

pub fn camera(id: &str, facing: FacingMode) -> MediaDeviceInfo {
    MediaDeviceInfo {
        id: id.to_string(),
        label: format!("Camera {}", id),
        kind: DeviceKind::VideoInput,
        facing,
    }
}

pub fn test_frame() -> CameraFrame {
    CameraFrame::from_rgba(8, 8, vec![128u8; 8 * 8 * 4])
}

const L_CODES: [&str; 10] = [
    "0001101", "0011001", "0010011", "0111101", "0100011", "0110001", "0101111", "0111011",
    "0110111", "0001011",
];
const G_CODES: [&str; 10] = [
    "0100111", "0110011", "0011011", "0100001", "0011101", "0111001", "0000101", "0010001",
    "0001001", "0010111",
];
const R_CODES: [&str; 10] = [
    "1110010", "1100110", "1101100", "1000010", "1011100", "1001110", "1010000", "1000100",
    "1001000", "1110100",
];
const PARITY: [&str; 10] = [
    "LLLLLL", "LLGLGG", "LLGGLG", "LLGGGL", "LGLLGG", "LGGLLG", "LGGGLL", "LGLGLG", "LGLGGL",
    "LGGLGL",
];

/// The 95 modules of an EAN-13 symbol, `1` for a bar
pub fn ean13_modules(code: &str) -> String {
    let digits: Vec<usize> = code.bytes().map(|b| (b - b'0') as usize).collect();
    assert_eq!(digits.len(), 13);

    let mut modules = String::from("101");
    for (i, &digit) in digits[1..7].iter().enumerate() {
        let g = PARITY[digits[0]].as_bytes()[i] == b'G';
        modules.push_str(if g { G_CODES[digit] } else { L_CODES[digit] });
    }
    modules.push_str("01010");
    for &digit in &digits[7..] {
        modules.push_str(R_CODES[digit]);
    }
    modules.push_str("101");
    modules
}

/// Black-on-white EAN-13 symbol with a ten module quiet zone either side
pub fn barcode_image(code: &str, unit: u32, height: u32) -> RgbaImage {
    let modules = ean13_modules(code).into_bytes();
    let quiet = 10 * unit;
    let width = modules.len() as u32 * unit + 2 * quiet;
    RgbaImage::from_fn(width, height, |x, _| {
        let bar = x >= quiet
            && x < width - quiet
            && modules[((x - quiet) / unit) as usize] == b'1';
        if bar {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    })
}

pub fn barcode_frame(code: &str, unit: u32, height: u32) -> CameraFrame {
    let img = barcode_image(code, unit, height);
    let (width, height) = img.dimensions();
    CameraFrame::from_rgba(width, height, img.into_raw())
}

pub fn encode_image(img: &RgbaImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// How the fake provider answers one acquisition
pub type AcquirePolicy =
    Box<dyn Fn(&Constraints, &[MediaDeviceInfo]) -> BackendResult<String> + Send + Sync>;

/// Exact id if present, first environment camera, then first camera
pub fn default_policy() -> AcquirePolicy {
    Box::new(|constraints, devices| match constraints {
        Constraints::ExactDevice(id) => devices
            .iter()
            .find(|d| &d.id == id)
            .map(|d| d.id.clone())
            .ok_or_else(|| BackendError::DeviceNotFound(id.clone())),
        Constraints::EnvironmentFacing => devices
            .iter()
            .find(|d| d.facing == FacingMode::Environment)
            .map(|d| d.id.clone())
            .ok_or_else(|| BackendError::Overconstrained("no rear camera".into())),
        Constraints::Any => devices
            .first()
            .map(|d| d.id.clone())
            .ok_or_else(|| BackendError::DeviceNotFound("no cameras".into())),
    })
}

/// Open/close bookkeeping shared with every stream the provider hands out
#[derive(Default)]
pub struct StreamTracker {
    pub open: AtomicUsize,
    pub max_open: AtomicUsize,
    pub released: Mutex<Vec<String>>,
}

impl StreamTracker {
    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

/// Called from inside `CaptureStream::stop`
pub type StopHook = Arc<dyn Fn() + Send + Sync>;

pub struct FakeProvider {
    pub devices: Mutex<Vec<MediaDeviceInfo>>,
    pub policy: Mutex<AcquirePolicy>,
    pub acquisitions: Mutex<Vec<Constraints>>,
    pub tracker: Arc<StreamTracker>,
    /// Latest frame served by every stream
    pub frame: Arc<Mutex<Option<CameraFrame>>>,
    /// When set, each acquisition waits for a permit
    hold: Mutex<Option<Arc<Semaphore>>>,
    on_stop: Mutex<Option<StopHook>>,
}

impl FakeProvider {
    pub fn new(devices: Vec<MediaDeviceInfo>) -> Arc<Self> {
        Arc::new(Self {
            devices: Mutex::new(devices),
            policy: Mutex::new(default_policy()),
            acquisitions: Mutex::new(Vec::new()),
            tracker: Arc::new(StreamTracker::default()),
            frame: Arc::new(Mutex::new(None)),
            hold: Mutex::new(None),
            on_stop: Mutex::new(None),
        })
    }

    pub fn with_frame(devices: Vec<MediaDeviceInfo>) -> Arc<Self> {
        let provider = Self::new(devices);
        provider.set_frame(Some(test_frame()));
        provider
    }

    pub fn set_policy(&self, policy: AcquirePolicy) {
        *self.policy.lock().unwrap() = policy;
    }

    pub fn deny_all(&self) {
        self.set_policy(Box::new(|_, _| {
            Err(BackendError::PermissionDenied("user said no".into()))
        }));
    }

    pub fn set_frame(&self, frame: Option<CameraFrame>) {
        *self.frame.lock().unwrap() = frame;
    }

    /// Make acquisitions wait until [`FakeProvider::release`]
    pub fn hold(&self) {
        *self.hold.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, n: usize) {
        if let Some(hold) = self.hold.lock().unwrap().as_ref() {
            hold.add_permits(n);
        }
    }

    /// Run `hook` whenever a stream handed out after this call is stopped
    pub fn on_stop(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_stop.lock().unwrap() = Some(Arc::new(hook));
    }

    pub fn acquisitions(&self) -> Vec<Constraints> {
        self.acquisitions.lock().unwrap().clone()
    }
}

impl MediaDeviceProvider for FakeProvider {
    fn enumerate(&self) -> BoxFuture<'_, BackendResult<Vec<MediaDeviceInfo>>> {
        let devices = self.devices.lock().unwrap().clone();
        Box::pin(async move { Ok(devices) })
    }

    fn acquire(
        &self,
        constraints: Constraints,
    ) -> BoxFuture<'_, BackendResult<Box<dyn CaptureStream>>> {
        self.acquisitions.lock().unwrap().push(constraints.clone());
        let hold = self.hold.lock().unwrap().clone();
        let on_stop = self.on_stop.lock().unwrap().clone();

        Box::pin(async move {
            if let Some(hold) = hold {
                hold.acquire().await.expect("hold closed").forget();
            }

            let devices = self.devices.lock().unwrap().clone();
            let device_id = {
                let policy = self.policy.lock().unwrap();
                (*policy)(&constraints, &devices)?
            };

            let open = self.tracker.open.fetch_add(1, Ordering::SeqCst) + 1;
            self.tracker.max_open.fetch_max(open, Ordering::SeqCst);

            Ok(Box::new(FakeStream {
                device_id,
                tracker: Arc::clone(&self.tracker),
                frame: Arc::clone(&self.frame),
                stopped: false,
                on_stop,
            }) as Box<dyn CaptureStream>)
        })
    }
}

pub struct FakeStream {
    device_id: String,
    tracker: Arc<StreamTracker>,
    frame: Arc<Mutex<Option<CameraFrame>>>,
    stopped: bool,
    on_stop: Option<StopHook>,
}

impl CaptureStream for FakeStream {
    fn latest_frame(&self) -> Option<CameraFrame> {
        if self.stopped {
            return None;
        }
        self.frame.lock().unwrap().clone()
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.tracker.open.fetch_sub(1, Ordering::SeqCst);
            self.tracker
                .released
                .lock()
                .unwrap()
                .push(self.device_id.clone());
            if let Some(hook) = &self.on_stop {
                hook();
            }
        }
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decode engine answering from a script
///
/// Scripted outcomes are used in order; once the script runs out every
/// decode returns the fallback.
pub struct FakeEngine {
    script: Mutex<VecDeque<DecodeOutcome>>,
    fallback: Mutex<DecodeOutcome>,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
    log: EventLog,
}

impl FakeEngine {
    pub fn new(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(DecodeOutcome::NotFound),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            gate: Mutex::new(None),
            log,
        })
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = DecodeOutcome>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    pub fn set_fallback(&self, outcome: DecodeOutcome) {
        *self.fallback.lock().unwrap() = outcome;
    }

    /// Block every decode until [`FakeEngine::release`]
    pub fn gate(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, n: usize) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> DecodeOutcome {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }
}

pub fn found(text: &str) -> DecodeOutcome {
    DecodeOutcome::Found(DecodedResult::new(text, "EAN-13"))
}

/// [`DecodeEngine`] view of a shared [`FakeEngine`]
pub struct EngineHandle(pub Arc<FakeEngine>);

impl DecodeEngine for EngineHandle {
    fn decode(&self, source: DecodeSource) -> BoxFuture<'static, DecodeOutcome> {
        let engine = EngineHandle(Arc::clone(&self.0));
        let label = match &source {
            DecodeSource::Frame(frame) => format!("decode:frame:{}x{}", frame.width, frame.height),
            DecodeSource::Image(image) => format!("decode:{}", image.container),
        };

        engine.0.calls.fetch_add(1, Ordering::SeqCst);
        let now = engine.0.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        engine.0.max_in_flight.fetch_max(now, Ordering::SeqCst);
        engine.0.log.lock().unwrap().push(label);
        let gate = engine.0.gate.lock().unwrap().clone();

        Box::pin(async move {
            if let Some(gate) = gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            let outcome = engine.0.next_outcome();
            engine.0.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        })
    }
}

/// Codec bridge returning a fixed answer
pub struct FakeBridge {
    answer: Mutex<Result<Vec<u8>, String>>,
    log: EventLog,
}

impl FakeBridge {
    pub fn new(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Ok(b"\x89PNG\r\n\x1a\nconverted".to_vec())),
            log,
        })
    }

    pub fn fail_with(&self, reason: &str) {
        *self.answer.lock().unwrap() = Err(reason.to_string());
    }
}

impl ImageCodecBridge for FakeBridge {
    fn transcode(
        &self,
        _bytes: Vec<u8>,
        source: ImageContainer,
    ) -> BoxFuture<'static, Result<Vec<u8>, TranscodeError>> {
        self.log.lock().unwrap().push(format!("transcode:{}", source));
        let answer = self.answer.lock().unwrap().clone();
        Box::pin(async move {
            answer.map_err(|reason| TranscodeError {
                container: source,
                reason,
            })
        })
    }
}

/// Everything a session test needs
pub struct Harness {
    pub scanner: Scanner,
    pub provider: Arc<FakeProvider>,
    pub engine: Arc<FakeEngine>,
    pub bridge: Arc<FakeBridge>,
    pub results: Arc<Mutex<Vec<DecodedResult>>>,
    pub log: EventLog,
}

impl Harness {
    pub fn new(provider: Arc<FakeProvider>) -> Self {
        let log = event_log();
        let engine = FakeEngine::new(Arc::clone(&log));
        let bridge = FakeBridge::new(Arc::clone(&log));
        let results = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&results);
        let scanner = Scanner::builder(
            Arc::clone(&provider) as Arc<dyn MediaDeviceProvider>,
            Arc::new(EngineHandle(Arc::clone(&engine))),
        )
        .bridge(Arc::clone(&bridge) as Arc<dyn ImageCodecBridge>)
        .config(ScannerConfig::default())
        .on_scan(move |result| sink.lock().unwrap().push(result))
        .build();

        Self {
            scanner,
            provider,
            engine,
            bridge,
            results,
            log,
        }
    }

    pub fn result_texts(&self) -> Vec<String> {
        self.results
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}
