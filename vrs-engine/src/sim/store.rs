//! Scripted reference store

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{ReferenceStore, StoreError, SyncError};
use crate::sync::SyncObserver;

fn default_steps() -> u64 {
    4
}

/// Result of one scripted sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyncScript {
    /// Report `steps` progress increments, then complete with `records`
    Succeed {
        records: u64,
        #[serde(default = "default_steps")]
        steps: u64,
    },
    /// Fail after one step; `records` is what was stored before failing
    Fail {
        kind: SimSyncFailure,
        #[serde(default)]
        records: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimSyncFailure {
    NoConnection,
    SlowConnection,
    Timeout,
    Server,
}

impl From<SimSyncFailure> for SyncError {
    fn from(failure: SimSyncFailure) -> Self {
        match failure {
            SimSyncFailure::NoConnection => SyncError::NoConnection,
            SimSyncFailure::SlowConnection => SyncError::SlowConnection,
            SimSyncFailure::Timeout => SyncError::Timeout,
            SimSyncFailure::Server => SyncError::Other {
                code: 500,
                message: "simulated server error".to_string(),
            },
        }
    }
}

/// State touched by the running sync task
#[derive(Debug, Default)]
struct Shared {
    records: AtomicU64,
    syncing: AtomicBool,
}

impl Shared {
    fn finish(&self, records: Option<u64>) {
        if let Some(records) = records {
            self.records.store(records, Ordering::SeqCst);
        }
        self.syncing.store(false, Ordering::SeqCst);
    }
}

/// In-memory store replaying scripted sync runs
///
/// Each `start_sync` consumes the next script; once the scripts run out,
/// syncs succeed without changing the record count.
#[derive(Debug)]
pub struct SimStore {
    shared: Arc<Shared>,
    scripts: Mutex<VecDeque<SyncScript>>,
    step_delay: Duration,
    credential_mismatch: bool,
    open: AtomicBool,
    syncs_started: AtomicU64,
    current: Mutex<Option<CancellationToken>>,
}

impl SimStore {
    pub fn new(records: u64) -> Self {
        let shared = Shared::default();
        shared.records.store(records, Ordering::SeqCst);
        Self {
            shared: Arc::new(shared),
            scripts: Mutex::new(VecDeque::new()),
            step_delay: Duration::from_millis(10),
            credential_mismatch: false,
            open: AtomicBool::new(false),
            syncs_started: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    pub fn with_syncs(mut self, scripts: impl IntoIterator<Item = SyncScript>) -> Self {
        self.scripts = Mutex::new(scripts.into_iter().collect());
        self
    }

    /// Delay before each progress step
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Fail `open()` as if the database belonged to other credentials
    pub fn with_credential_mismatch(mut self) -> Self {
        self.credential_mismatch = true;
        self
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn syncs_started(&self) -> u64 {
        self.syncs_started.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> SyncScript {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts.pop_front().unwrap_or(SyncScript::Succeed {
            records: self.record_count(),
            steps: 1,
        })
    }
}

impl ReferenceStore for SimStore {
    fn open(&self) -> Result<(), StoreError> {
        if self.credential_mismatch {
            return Err(StoreError::CredentialMismatch);
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.cancel_sync();
        self.open.store(false, Ordering::SeqCst);
    }

    fn record_count(&self) -> u64 {
        self.shared.records.load(Ordering::SeqCst)
    }

    fn start_sync(&self, observer: SyncObserver) {
        if self.shared.syncing.swap(true, Ordering::SeqCst) {
            debug!("Simulated sync already running");
            return;
        }
        self.syncs_started.fetch_add(1, Ordering::SeqCst);

        let script = self.next_script();
        let token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());

        info!(generation = observer.generation(), ?script, "Simulated sync started");
        tokio::spawn(run_sync(
            self.shared.clone(),
            script,
            self.step_delay,
            token,
            observer,
        ));
    }

    fn cancel_sync(&self) {
        if let Some(token) = self.current.lock().unwrap_or_else(|e| e.into_inner()).take() {
            token.cancel();
        }
    }
}

/// Sleep one step; false if cancelled meanwhile
async fn step(delay: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn run_sync(
    shared: Arc<Shared>,
    script: SyncScript,
    delay: Duration,
    token: CancellationToken,
    observer: SyncObserver,
) {
    observer.started();

    match script {
        SyncScript::Succeed { records, steps } => {
            let total = steps.max(1);
            for current in 1..=total {
                if !step(delay, &token).await {
                    shared.finish(None);
                    observer.failed(SyncError::Cancelled);
                    return;
                }
                observer.progress(current, total);
            }
            shared.finish(Some(records));
            observer.completed();
        }
        SyncScript::Fail { kind, records } => {
            if !step(delay, &token).await {
                shared.finish(None);
                observer.failed(SyncError::Cancelled);
                return;
            }
            shared.finish(records);
            observer.failed(kind.into());
        }
    }
}
