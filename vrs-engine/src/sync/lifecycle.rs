//! Sync lifecycle state machine
//!
//! Pure state: no I/O, no clock reads. The coordinator feeds it record
//! counts and timestamps and turns the returned decisions into store calls
//! and events.
//!
//! ```text
//! NotSynced ──start──> Syncing ──ok──> Ready <──recover── SyncFailed
//!                         │                                  ▲
//!                         └──────────────fail────────────────┘
//! Ready ⇄ Syncing (warm re-syncs)
//! ```
//!
//! The lifecycle outlives pause/start cycles of a session, which is how the
//! first start of the process (always syncs) is told apart from a resume
//! (gated).

use chrono::{DateTime, Utc};
use vrs_common::{SyncPhase, SyncStatus};

use super::SyncGate;
use crate::backend::SyncError;

/// What a session start should do about syncing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDecision {
    /// Gate says the data is fresh enough
    Skip,
    /// Scan immediately, sync silently
    Background,
    /// Cold start: hold scanning until the sync resolves
    Blocking,
    /// A sync is already running; nothing new to start
    InProgress,
}

/// Result of a sync completion or failure callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResolution {
    /// Sync succeeded; `unblocked` is true if this ended a cold-start hold
    Ready { unblocked: bool },
    /// Sync failed; the lifecycle is in `SyncFailed`
    ///
    /// Unless `fatal`, the caller re-checks the record count and calls
    /// [`SyncLifecycle::recover`].
    Failed {
        cold_start: bool,
        fatal: bool,
        message: String,
    },
    /// Store cancelled the sync on its own
    Cancelled,
}

/// Cold/warm start tracking and elapsed-time gating
#[derive(Debug, Clone)]
pub struct SyncLifecycle {
    gate: SyncGate,
    phase: SyncPhase,
    status: SyncStatus,
    generation: u64,
    started_once: bool,
    blocking: bool,
    fatal: bool,
}

impl SyncLifecycle {
    pub fn new(gate: SyncGate) -> Self {
        Self {
            gate,
            phase: SyncPhase::NotSynced,
            status: SyncStatus::default(),
            generation: 0,
            started_once: false,
            blocking: false,
            fatal: false,
        }
    }

    pub fn set_gate(&mut self, gate: SyncGate) {
        self.gate = gate;
    }

    pub fn gate(&self) -> SyncGate {
        self.gate
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Scanning held until the cold-start sync resolves
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn allows_scanning(&self) -> bool {
        !self.blocking && !self.fatal
    }

    /// A session has started and scanning is allowed
    pub fn is_ready(&self) -> bool {
        self.started_once && self.allows_scanning()
    }

    /// Decide what a session start does about syncing
    ///
    /// The first start of the process computes the cold-start flag and
    /// always syncs. Later starts apply the gate.
    pub fn evaluate_start(&mut self, record_count: u64, now: DateTime<Utc>) -> StartDecision {
        self.status.record_count = record_count;

        if !self.started_once {
            self.started_once = true;
            self.status.cold_start = record_count == 0;
            if self.status.syncing {
                self.blocking = self.status.cold_start;
                return StartDecision::InProgress;
            }
            return if self.status.cold_start {
                StartDecision::Blocking
            } else {
                StartDecision::Background
            };
        }

        if self.status.syncing {
            return StartDecision::InProgress;
        }

        if self.gate_allows(now) {
            StartDecision::Background
        } else {
            StartDecision::Skip
        }
    }

    fn gate_allows(&self, now: DateTime<Utc>) -> bool {
        match self.gate {
            SyncGate::Always => true,
            SyncGate::Elapsed { interval } => match self.status.last_sync_at {
                Some(last) => now - last > interval,
                None => true,
            },
        }
    }

    /// Enter `Syncing`
    ///
    /// Returns the generation to hand to the store's observer, or `None`
    /// if a sync is already running.
    pub fn begin_sync(&mut self) -> Option<u64> {
        if self.status.syncing || self.fatal {
            return None;
        }
        self.generation += 1;
        self.phase = SyncPhase::Syncing;
        self.status.syncing = true;
        self.blocking = self.status.cold_start;
        Some(self.generation)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.status.syncing && generation == self.generation
    }

    /// Progress for the running sync; `Some(blocking)` if it should be shown
    pub fn on_progress(&self, generation: u64) -> Option<bool> {
        self.is_current(generation).then_some(self.blocking)
    }

    pub fn on_completed(
        &mut self,
        generation: u64,
        record_count: u64,
        now: DateTime<Utc>,
    ) -> Option<SyncResolution> {
        if !self.is_current(generation) {
            return None;
        }
        let unblocked = self.blocking;
        self.phase = SyncPhase::Ready;
        self.status.syncing = false;
        self.status.record_count = record_count;
        self.status.last_sync_at = Some(now);
        self.status.cold_start = false;
        self.blocking = false;
        Some(SyncResolution::Ready { unblocked })
    }

    /// Failed syncs never update `last_sync_at`
    ///
    /// A store cancellation is not an error unless it ends a cold-start
    /// hold; then it resolves like any other failure, so scanning never
    /// waits on a sync that is no longer running.
    pub fn on_failed(
        &mut self,
        generation: u64,
        error: &SyncError,
        record_count: u64,
    ) -> Option<SyncResolution> {
        if !self.is_current(generation) {
            return None;
        }
        self.status.syncing = false;
        self.status.record_count = record_count;

        if matches!(error, SyncError::Cancelled) && !self.blocking {
            self.phase = if self.status.last_sync_at.is_some() {
                SyncPhase::Ready
            } else {
                SyncPhase::NotSynced
            };
            return Some(SyncResolution::Cancelled);
        }

        let cold_start = self.status.cold_start;
        self.status.cold_start = false;
        self.phase = SyncPhase::SyncFailed;

        let fatal = cold_start && record_count == 0;
        if fatal {
            self.fatal = true;
        }
        Some(SyncResolution::Failed {
            cold_start,
            fatal,
            message: error.user_message(),
        })
    }

    /// `SyncFailed → Ready` after re-checking the record count
    ///
    /// Returns true if this ended a cold-start hold.
    pub fn recover(&mut self, record_count: u64) -> bool {
        if self.phase != SyncPhase::SyncFailed || self.fatal {
            return false;
        }
        self.status.record_count = record_count;
        self.phase = SyncPhase::Ready;
        let unblocked = self.blocking;
        self.blocking = false;
        unblocked
    }

    /// Forget the running sync (shutdown); later callbacks are stale
    pub fn abandon(&mut self) -> bool {
        if !self.status.syncing {
            return false;
        }
        self.generation += 1;
        self.status.syncing = false;
        self.phase = if self.status.last_sync_at.is_some() {
            SyncPhase::Ready
        } else {
            SyncPhase::NotSynced
        };
        true
    }
}
