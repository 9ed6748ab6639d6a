//! Lock and sync status type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::outcome_types::{RecognitionOutcome, ScanOptions};

/// Stabilized, externally displayed recognition result
///
/// `miss_count` only exists while locked and is reset to 0 on every
/// confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Empty,
    Locked {
        outcome: RecognitionOutcome,
        miss_count: u32,
        last_seen_at: DateTime<Utc>,
    },
}

impl LockState {
    pub fn locked(outcome: RecognitionOutcome, last_seen_at: DateTime<Utc>) -> Self {
        LockState::Locked {
            outcome,
            miss_count: 0,
            last_seen_at,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, LockState::Locked { .. })
    }

    /// Currently displayed outcome, if any
    pub fn outcome(&self) -> Option<&RecognitionOutcome> {
        match self {
            LockState::Empty => None,
            LockState::Locked { outcome, .. } => Some(outcome),
        }
    }

    pub fn miss_count(&self) -> Option<u32> {
        match self {
            LockState::Empty => None,
            LockState::Locked { miss_count, .. } => Some(*miss_count),
        }
    }

    /// True when both states display the same value
    ///
    /// Miss counter and timestamp are ignored.
    pub fn same_visible_value(&self, other: &LockState) -> bool {
        self.outcome() == other.outcome()
    }
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockState::Empty => write!(f, "Empty"),
            LockState::Locked {
                outcome,
                miss_count,
                ..
            } => write!(f, "Locked({}, misses={})", outcome, miss_count),
        }
    }
}

/// Phase of the sync lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// No sync has resolved yet in this process
    #[default]
    NotSynced,
    Syncing,
    Ready,
    /// Last sync failed; scanning continues on existing data
    SyncFailed,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::NotSynced => write!(f, "NotSynced"),
            SyncPhase::Syncing => write!(f, "Syncing"),
            SyncPhase::Ready => write!(f, "Ready"),
            SyncPhase::SyncFailed => write!(f, "SyncFailed"),
        }
    }
}

/// Reference database sync status
///
/// `cold_start` is true iff the record count was 0 at session start, and
/// becomes permanently false once the first sync resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncStatus {
    pub record_count: u64,
    pub cold_start: bool,
    pub syncing: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Session-terminating condition kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalKind {
    /// Device failed the backend's compatibility check
    DeviceIncompatible,
    /// Cold-start sync failed and the reference database is still empty
    EmptyDatabaseAfterSync,
    /// Stored database belongs to different credentials
    CredentialMismatch,
}

impl std::fmt::Display for FatalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FatalKind::DeviceIncompatible => write!(f, "DeviceIncompatible"),
            FatalKind::EmptyDatabaseAfterSync => write!(f, "EmptyDatabaseAfterSync"),
            FatalKind::CredentialMismatch => write!(f, "CredentialMismatch"),
        }
    }
}

/// Snapshot of everything a presentation layer shows about a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    /// Frames are being pulled and scanned
    pub scanning: bool,
    /// Sync lifecycle allows scanning
    pub ready: bool,
    /// A snapshot search is pending
    pub searching: bool,
    pub sync_phase: SyncPhase,
    pub sync: SyncStatus,
    pub lock: LockState,
    pub image_search: bool,
    pub decode_ean8: bool,
    pub decode_ean13: bool,
    pub decode_qrcode: bool,
}

impl SessionStatus {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            scanning: false,
            ready: false,
            searching: false,
            sync_phase: SyncPhase::NotSynced,
            sync: SyncStatus::default(),
            lock: LockState::Empty,
            image_search: false,
            decode_ean8: false,
            decode_ean13: false,
            decode_qrcode: false,
        }
    }

    /// Copy the enabled-format flags from a scan option set
    pub fn set_scan_options(&mut self, options: ScanOptions) {
        self.image_search = options.image_enabled();
        self.decode_ean8 = options.contains(ScanOptions::EAN8);
        self.decode_ean13 = options.contains(ScanOptions::EAN13);
        self.decode_qrcode = options.contains(ScanOptions::QRCODE);
    }
}
