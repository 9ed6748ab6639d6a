//! Fake collaborators with test-side controls

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use vrs_common::{BarcodeKind, ManualClock, ScanOptions, SessionStatus};
use vrs_engine::backend::{
    BackendError, FrameSource, RecognitionBackend, ReferenceStore, ScanServices, StoreError,
    SyncError,
};
use vrs_engine::config::SessionConfig;
use vrs_engine::frame::{Frame, FramePool};
use vrs_engine::session::Session;
use vrs_engine::sim::{label_frame, SimBackend};
use vrs_engine::sync::SyncObserver;

use super::{wait_until, EventLog};

// ============================================================================
// Backend
// ============================================================================

/// Label-reading backend whose calls can be held until released
///
/// Tests holding the gate must release it before returning, otherwise the
/// blocked worker keeps the runtime from shutting down.
pub struct GatedBackend {
    inner: SimBackend,
    compatible: bool,
    closed: Mutex<bool>,
    opened: Condvar,
    entered: AtomicUsize,
}

impl GatedBackend {
    pub fn new() -> Self {
        Self {
            inner: SimBackend::new(),
            compatible: true,
            closed: Mutex::new(false),
            opened: Condvar::new(),
            entered: AtomicUsize::new(0),
        }
    }

    pub fn incompatible() -> Self {
        Self {
            compatible: false,
            ..Self::new()
        }
    }

    /// Block every following backend call
    pub fn hold(&self) {
        *self.closed.lock().unwrap() = true;
    }

    pub fn release(&self) {
        *self.closed.lock().unwrap() = false;
        self.opened.notify_all();
    }

    /// Backend calls started so far (held or not)
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    fn pass(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut closed = self.closed.lock().unwrap();
        while *closed {
            closed = self.opened.wait(closed).unwrap();
        }
    }
}

impl RecognitionBackend for GatedBackend {
    fn verify(&self, frame: &Frame, expected_id: &str) -> Result<bool, BackendError> {
        self.pass();
        self.inner.verify(frame, expected_id)
    }

    fn search(&self, frame: &Frame) -> Result<Option<String>, BackendError> {
        self.pass();
        self.inner.search(frame)
    }

    fn decode_barcode(
        &self,
        frame: &Frame,
        formats: ScanOptions,
    ) -> Result<Option<(BarcodeKind, String)>, BackendError> {
        self.pass();
        self.inner.decode_barcode(frame, formats)
    }

    fn check_compatibility(&self) -> Result<(), String> {
        if self.compatible {
            Ok(())
        } else {
            Err("camera does not support autofocus".to_string())
        }
    }

    fn remote_search(&self, frame: &Frame) -> Result<Option<String>, BackendError> {
        self.pass();
        self.inner.remote_search(frame)
    }
}

// ============================================================================
// Reference store
// ============================================================================

/// Store whose syncs are driven step by step by the test
pub struct ControlledStore {
    records: AtomicU64,
    open: AtomicBool,
    credential_mismatch: bool,
    observer: Mutex<Option<SyncObserver>>,
    syncs_started: AtomicUsize,
    cancels: AtomicUsize,
}

impl ControlledStore {
    pub fn new(records: u64) -> Self {
        Self {
            records: AtomicU64::new(records),
            open: AtomicBool::new(false),
            credential_mismatch: false,
            observer: Mutex::new(None),
            syncs_started: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        }
    }

    pub fn with_credential_mismatch(mut self) -> Self {
        self.credential_mismatch = true;
        self
    }

    pub fn syncs_started(&self) -> usize {
        self.syncs_started.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn set_records(&self, records: u64) {
        self.records.store(records, Ordering::SeqCst);
    }

    fn observer(&self) -> SyncObserver {
        self.observer
            .lock()
            .unwrap()
            .clone()
            .expect("no sync has been started")
    }

    pub fn progress(&self, current: u64, total: u64) {
        self.observer().progress(current, total);
    }

    /// Finish the running sync with `records` stored
    pub fn complete(&self, records: u64) {
        self.set_records(records);
        self.observer().completed();
    }

    /// Fail the running sync with `records` left in the database
    pub fn fail(&self, error: SyncError, records: u64) {
        self.set_records(records);
        self.observer().failed(error);
    }
}

impl ReferenceStore for ControlledStore {
    fn open(&self) -> Result<(), StoreError> {
        if self.credential_mismatch {
            return Err(StoreError::CredentialMismatch);
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn record_count(&self) -> u64 {
        self.records.load(Ordering::SeqCst)
    }

    fn start_sync(&self, observer: SyncObserver) {
        self.syncs_started.fetch_add(1, Ordering::SeqCst);
        observer.started();
        *self.observer.lock().unwrap() = Some(observer);
    }

    fn cancel_sync(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Frame source
// ============================================================================

/// Counts frame requests
#[derive(Default)]
pub struct RecordingFrameSource {
    requests: AtomicUsize,
}

impl RecordingFrameSource {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub async fn wait_for_requests(&self, count: usize) {
        wait_until(&format!("{} frame requests", count), || self.requests() >= count).await;
    }
}

impl FrameSource for RecordingFrameSource {
    fn request_frame(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Rig
// ============================================================================

/// Session wired to fakes, with an event subscription taken before any
/// command is sent
pub struct TestRig {
    pub session: Session,
    pub backend: Arc<GatedBackend>,
    pub store: Arc<ControlledStore>,
    pub frames: Arc<RecordingFrameSource>,
    pub clock: Arc<ManualClock>,
    pub pool: FramePool,
    pub events: EventLog,
}

impl TestRig {
    pub fn new(backend: GatedBackend, store: ControlledStore) -> Self {
        let backend = Arc::new(backend);
        let store = Arc::new(store);
        let frames = Arc::new(RecordingFrameSource::default());
        let clock = Arc::new(ManualClock::new(
            chrono::DateTime::parse_from_rfc3339("2025-03-01T08:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
        ));

        let services = ScanServices::new(backend.clone(), store.clone(), frames.clone());
        let session = Session::new(services, clock.clone());
        let events = EventLog::new(session.subscribe());

        Self {
            session,
            backend,
            store,
            frames,
            clock,
            pool: FramePool::new(4),
            events,
        }
    }

    pub fn with_records(records: u64) -> Self {
        Self::new(GatedBackend::new(), ControlledStore::new(records))
    }

    pub async fn configure(&self, config: SessionConfig) {
        self.session
            .configure(config.scan_options(), config)
            .await
            .expect("configure");
    }

    /// Configure with defaults and start
    pub async fn start_default(&self) {
        self.configure(SessionConfig::default()).await;
        self.session.start().await.expect("start");
    }

    pub fn frame(&self, label: &str) -> Frame {
        label_frame(&self.pool, label, self.clock_now()).expect("scripted frame")
    }

    pub fn submit(&self, label: &str) {
        self.session.submit_frame(self.frame(label));
    }

    /// Submit a frame that will be accepted and wait until its result has
    /// been applied
    pub async fn recognize(&self, label: &str) {
        let before = self.frames.requests();
        self.submit(label);
        self.frames.wait_for_requests(before + 1).await;
        self.barrier().await;
    }

    /// Round-trip through the coordinator so everything queued before has
    /// been handled; only valid while the session is started
    pub async fn barrier(&self) {
        self.session.start().await.expect("barrier");
    }

    pub async fn status(&self) -> SessionStatus {
        self.session.status().await
    }

    fn clock_now(&self) -> chrono::DateTime<chrono::Utc> {
        use vrs_common::Clock;
        self.clock.now()
    }
}
