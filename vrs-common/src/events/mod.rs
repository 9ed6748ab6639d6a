//! Event types for the VRS event system
//!
//! Provides the session event definitions and the EventBus shared by the
//! engine and its presentation layers.

// Sub-modules (supporting types)
mod outcome_types;
mod status_types;

pub use outcome_types::{BarcodeKind, OutcomeKind, RecognitionOutcome, ScanOptions};
pub use status_types::{FatalKind, LockState, SessionStatus, SyncPhase, SyncStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Session events
///
/// Emitted by the session coordinator in the order their causing
/// transitions occurred, and serializable for transmission to a UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEvent {
    /// Externally visible lock value changed
    ///
    /// Not emitted for miss-counter increments that keep the same value.
    LockChanged {
        lock: LockState,
        timestamp: DateTime<Utc>,
    },

    /// Sync progress report
    SyncProgress {
        current: u64,
        total: u64,
        /// Scanning is blocked until this sync resolves (cold start)
        blocking: bool,
        timestamp: DateTime<Utc>,
    },

    /// Sync lifecycle transition
    SyncStateChanged {
        phase: SyncPhase,
        status: SyncStatus,
        timestamp: DateTime<Utc>,
    },

    /// Sync failed but scanning continues with existing data
    SyncWarning {
        message: String,
        record_count: u64,
        timestamp: DateTime<Utc>,
    },

    /// Session cannot continue; the caller is expected to terminate it
    FatalError {
        kind: FatalKind,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Backend reported a misuse-class error (programming fault)
    DeveloperFault {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Scanning started or stopped, or the status snapshot changed
    ScanningStateChanged {
        status: SessionStatus,
        timestamp: DateTime<Utc>,
    },

    /// Snapshot search became pending or finished
    SnapshotSearchStateChanged {
        searching: bool,
        timestamp: DateTime<Utc>,
    },

    /// Snapshot search result
    SnapshotSearchCompleted {
        outcome: RecognitionOutcome,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl ScanEvent {
    /// Get event type as string
    pub fn event_type(&self) -> &str {
        match self {
            ScanEvent::LockChanged { .. } => "LockChanged",
            ScanEvent::SyncProgress { .. } => "SyncProgress",
            ScanEvent::SyncStateChanged { .. } => "SyncStateChanged",
            ScanEvent::SyncWarning { .. } => "SyncWarning",
            ScanEvent::FatalError { .. } => "FatalError",
            ScanEvent::DeveloperFault { .. } => "DeveloperFault",
            ScanEvent::ScanningStateChanged { .. } => "ScanningStateChanged",
            ScanEvent::SnapshotSearchStateChanged { .. } => "SnapshotSearchStateChanged",
            ScanEvent::SnapshotSearchCompleted { .. } => "SnapshotSearchCompleted",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ScanEvent::LockChanged { timestamp, .. }
            | ScanEvent::SyncProgress { timestamp, .. }
            | ScanEvent::SyncStateChanged { timestamp, .. }
            | ScanEvent::SyncWarning { timestamp, .. }
            | ScanEvent::FatalError { timestamp, .. }
            | ScanEvent::DeveloperFault { timestamp, .. }
            | ScanEvent::ScanningStateChanged { timestamp, .. }
            | ScanEvent::SnapshotSearchStateChanged { timestamp, .. }
            | ScanEvent::SnapshotSearchCompleted { timestamp, .. } => *timestamp,
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over a tokio broadcast channel. Slow subscribers lag and
/// lose the oldest events rather than blocking the emitter.
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use vrs_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    ///
    /// # Examples
    ///
    /// ```
    /// use vrs_common::events::{EventBus, ScanEvent};
    ///
    /// let event_bus = EventBus::new(16);
    /// let event = ScanEvent::DeveloperFault {
    ///     message: "scan with empty database".to_string(),
    ///     timestamp: chrono::Utc::now(),
    /// };
    ///
    /// if event_bus.emit(event).is_err() {
    ///     eprintln!("Warning: No subscribers for developer fault");
    /// }
    /// ```
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: ScanEvent) -> Result<usize, broadcast::error::SendError<ScanEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
