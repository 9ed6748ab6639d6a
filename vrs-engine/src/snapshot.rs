//! Snapshot (online) search
//!
//! A user-requested, one-shot remote search. The request waits for the next
//! delivered frame, which is sent to the backend's remote search instead of
//! the offline pipeline. Offline scanning is suspended until the search
//! completes or is cancelled.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vrs_common::RecognitionOutcome;

use crate::backend::{BackendError, RecognitionBackend};
use crate::frame::Frame;
use crate::scheduler::TaskOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SnapshotState {
    #[default]
    Idle,
    /// Waiting for a frame
    Requested,
    /// Remote search running on a worker
    Running,
}

/// Snapshot search request tracking
#[derive(Debug, Clone, Default)]
pub struct SnapshotSearch {
    state: SnapshotState,
}

impl SnapshotSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if a search is already pending
    pub fn request(&mut self) -> bool {
        if self.state != SnapshotState::Idle {
            return false;
        }
        self.state = SnapshotState::Requested;
        true
    }

    /// Waiting for a frame to search with
    pub fn wants_frame(&self) -> bool {
        self.state == SnapshotState::Requested
    }

    /// Frame handed to a worker
    pub fn mark_running(&mut self) {
        if self.state == SnapshotState::Requested {
            self.state = SnapshotState::Running;
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == SnapshotState::Running
    }

    /// Requested or running
    pub fn is_searching(&self) -> bool {
        self.state != SnapshotState::Idle
    }

    /// Back to idle; returns true if a search was pending
    pub fn clear(&mut self) -> bool {
        let was_searching = self.is_searching();
        self.state = SnapshotState::Idle;
        was_searching
    }
}

/// Worker job running a remote search on one frame
pub fn remote_search_job(
    backend: Arc<dyn RecognitionBackend>,
) -> impl FnOnce(&Frame, &CancellationToken) -> TaskOutput + Send + 'static {
    move |frame, token| {
        if token.is_cancelled() {
            return TaskOutput::Snapshot(Ok(None));
        }
        TaskOutput::Snapshot(backend.remote_search(frame))
    }
}

/// Map a remote search result to the published outcome and error message
pub fn snapshot_outcome(
    result: Result<Option<String>, BackendError>,
) -> (RecognitionOutcome, Option<String>) {
    match result {
        Ok(Some(id)) => (RecognitionOutcome::image(id), None),
        Ok(None) => (RecognitionOutcome::None, None),
        Err(e) => (RecognitionOutcome::None, Some(e.to_string())),
    }
}
