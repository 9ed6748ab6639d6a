//! Reference database sync lifecycle
//!
//! The store runs syncs on its own machinery and reports back through a
//! [`SyncObserver`]. The observer never touches session state; it only
//! enqueues [`SyncNotice`]s that the coordinator applies to the
//! [`SyncLifecycle`] in arrival order.

mod lifecycle;

pub use lifecycle::{StartDecision, SyncLifecycle, SyncResolution};

use tokio::sync::mpsc;

use crate::backend::SyncError;

/// Re-sync policy applied when a session (re)starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncGate {
    /// Sync only if the last successful sync is older than `interval`
    Elapsed { interval: chrono::Duration },
    /// Sync on every start
    Always,
}

impl Default for SyncGate {
    fn default() -> Self {
        SyncGate::Elapsed {
            interval: chrono::Duration::hours(24),
        }
    }
}

/// Sync callback, tagged with the sync generation it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct SyncNotice {
    pub generation: u64,
    pub kind: SyncNoticeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncNoticeKind {
    Started,
    Progress { current: u64, total: u64 },
    Completed,
    Failed(SyncError),
}

/// Callback handle given to [`ReferenceStore::start_sync`](crate::backend::ReferenceStore::start_sync)
///
/// Cheap to clone and safe to call from any thread. Calls after the session
/// has shut down, or for a sync the session abandoned, are ignored.
#[derive(Debug, Clone)]
pub struct SyncObserver {
    generation: u64,
    tx: mpsc::UnboundedSender<SyncNotice>,
}

impl SyncObserver {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<SyncNotice>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn started(&self) {
        self.send(SyncNoticeKind::Started);
    }

    pub fn progress(&self, current: u64, total: u64) {
        self.send(SyncNoticeKind::Progress { current, total });
    }

    pub fn completed(&self) {
        self.send(SyncNoticeKind::Completed);
    }

    pub fn failed(&self, error: SyncError) {
        self.send(SyncNoticeKind::Failed(error));
    }

    fn send(&self, kind: SyncNoticeKind) {
        let _ = self.tx.send(SyncNotice {
            generation: self.generation,
            kind,
        });
    }
}
