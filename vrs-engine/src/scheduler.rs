//! Frame scheduler
//!
//! Pull-based, single-in-flight dispatch of frames to blocking workers.
//!
//! - A frame submitted while a task is in flight is dropped, never queued.
//! - A completed task triggers exactly one new frame request.
//! - `cancel()` forgets the in-flight task and signals its token; the
//!   worker drops its frame as soon as it observes the token, and its
//!   completion is discarded as stale.
//!
//! The scheduler is owned by the session coordinator and is not shared.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use vrs_common::RecognitionOutcome;

use crate::backend::{BackendError, FrameSource};
use crate::frame::Frame;
use crate::pipeline::PipelineFault;

/// Monotonically increasing task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// What a worker is doing with its frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Offline recognition pipeline
    Recognition,
    /// One-shot remote search
    Snapshot,
}

/// Worker result
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    Recognition(Result<RecognitionOutcome, PipelineFault>),
    Snapshot(Result<Option<String>, BackendError>),
}

/// Message a worker sends back when it finishes
#[derive(Debug)]
pub struct TaskCompletion {
    pub task_id: TaskId,
    pub output: TaskOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted(TaskId),
    Dropped,
}

/// Diagnostic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub accepted: u64,
    pub dropped: u64,
    pub completed: u64,
    pub cancelled: u64,
}

struct InFlight {
    id: TaskId,
    kind: TaskKind,
    token: CancellationToken,
}

pub struct FrameScheduler {
    frames: Arc<dyn FrameSource>,
    completions: mpsc::UnboundedSender<TaskCompletion>,
    next_id: u64,
    in_flight: Option<InFlight>,
    stats: SchedulerStats,
}

impl FrameScheduler {
    pub fn new(
        frames: Arc<dyn FrameSource>,
        completions: mpsc::UnboundedSender<TaskCompletion>,
    ) -> Self {
        Self {
            frames,
            completions,
            next_id: 0,
            in_flight: None,
            stats: SchedulerStats::default(),
        }
    }

    /// Hand `frame` to a blocking worker running `job`, or drop it if busy
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F>(&mut self, kind: TaskKind, frame: Frame, job: F) -> Submission
    where
        F: FnOnce(&Frame, &CancellationToken) -> TaskOutput + Send + 'static,
    {
        if let Some(current) = &self.in_flight {
            self.stats.dropped += 1;
            trace!(in_flight = %current.id, "Frame dropped, task in flight");
            return Submission::Dropped;
        }

        self.next_id += 1;
        let id = TaskId(self.next_id);
        let token = CancellationToken::new();
        self.in_flight = Some(InFlight {
            id,
            kind,
            token: token.clone(),
        });
        self.stats.accepted += 1;
        trace!(task_id = %id, ?kind, "Task accepted");

        let tx = self.completions.clone();
        tokio::task::spawn_blocking(move || {
            let output = job(&frame, &token);
            drop(frame);
            let _ = tx.send(TaskCompletion {
                task_id: id,
                output,
            });
        });

        Submission::Accepted(id)
    }

    /// Accept a worker's completion
    ///
    /// Returns the output only for the in-flight task, after requesting the
    /// next frame. Completions of cancelled tasks return `None`.
    pub fn complete(&mut self, completion: TaskCompletion) -> Option<TaskOutput> {
        match &self.in_flight {
            Some(current) if current.id == completion.task_id => {
                self.in_flight = None;
                self.stats.completed += 1;
                trace!(task_id = %completion.task_id, "Task completed");
                self.frames.request_frame();
                Some(completion.output)
            }
            _ => {
                trace!(task_id = %completion.task_id, "Discarding stale completion");
                None
            }
        }
    }

    /// Cancel the in-flight task, if any
    ///
    /// Does not request a frame. Returns true if a task was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.in_flight.take() {
            Some(current) => {
                current.token.cancel();
                self.stats.cancelled += 1;
                debug!(task_id = %current.id, kind = ?current.kind, "Task cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel the in-flight task only if it is of `kind`
    pub fn cancel_kind(&mut self, kind: TaskKind) -> bool {
        if self.in_flight_kind() == Some(kind) {
            self.cancel()
        } else {
            false
        }
    }

    /// Ask the frame source for a frame outside the completion cycle
    pub fn request_frame(&self) {
        self.frames.request_frame();
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<TaskId> {
        self.in_flight.as_ref().map(|current| current.id)
    }

    pub fn in_flight_kind(&self) -> Option<TaskKind> {
        self.in_flight.as_ref().map(|current| current.kind)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}
