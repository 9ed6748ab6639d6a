//! Session coordinator task
//!
//! Owns the scheduler, stabilizer, sync lifecycle and snapshot search, and
//! is the only place session state is mutated. Commands, worker completions
//! and sync notices arrive on separate channels and are handled one at a
//! time, so every emission follows the order of its causing transition.

use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;
use vrs_common::{
    Clock, EventBus, FatalKind, RecognitionOutcome, ScanEvent, ScanOptions, SessionStatus,
};

use super::Command;
use crate::backend::{ScanServices, StoreError, SyncError};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::pipeline::{PipelineFault, RecognitionPipeline};
use crate::scheduler::{FrameScheduler, Submission, TaskCompletion, TaskKind, TaskOutput};
use crate::snapshot::{remote_search_job, snapshot_outcome, SnapshotSearch};
use crate::stabilizer::ResultStabilizer;
use crate::sync::{
    StartDecision, SyncLifecycle, SyncNotice, SyncNoticeKind, SyncObserver, SyncResolution,
};

/// Active scan configuration
struct Configured {
    options: ScanOptions,
    pipeline: RecognitionPipeline,
}

pub(crate) struct Coordinator {
    session_id: Uuid,
    services: ScanServices,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    shared_status: Arc<RwLock<SessionStatus>>,
    sync_tx: mpsc::UnboundedSender<SyncNotice>,

    configured: Option<Configured>,
    scheduler: FrameScheduler,
    stabilizer: ResultStabilizer,
    lifecycle: SyncLifecycle,
    snapshot: SnapshotSearch,

    /// `start()` accepted and not paused since
    started: bool,
    store_open: bool,
    terminated: Option<(FatalKind, String)>,
}

pub(crate) struct Channels {
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub completions: mpsc::UnboundedReceiver<TaskCompletion>,
    pub notices: mpsc::UnboundedReceiver<SyncNotice>,
}

impl Coordinator {
    /// Build the coordinator and the receiving ends of its channels
    pub(crate) fn new(
        session_id: Uuid,
        services: ScanServices,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
        shared_status: Arc<RwLock<SessionStatus>>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> (Self, Channels) {
        let (completion_tx, completions) = mpsc::unbounded_channel();
        let (sync_tx, notices) = mpsc::unbounded_channel();
        let scheduler = FrameScheduler::new(services.frames.clone(), completion_tx);

        let coordinator = Self {
            session_id,
            services,
            clock,
            events,
            shared_status,
            sync_tx,
            configured: None,
            scheduler,
            stabilizer: ResultStabilizer::default(),
            lifecycle: SyncLifecycle::new(Default::default()),
            snapshot: SnapshotSearch::new(),
            started: false,
            store_open: false,
            terminated: None,
        };
        (
            coordinator,
            Channels {
                commands,
                completions,
                notices,
            },
        )
    }

    /// Coordination loop; returns when shut down or when the session handle
    /// is dropped
    pub(crate) async fn run(mut self, mut channels: Channels) {
        debug!(session_id = %self.session_id, "Session coordinator started");

        loop {
            tokio::select! {
                command = channels.commands.recv() => {
                    match command {
                        Some(Command::Shutdown { reply }) => {
                            self.shutdown().await;
                            let _ = reply.send(());
                            break;
                        }
                        Some(command) => self.handle_command(command).await,
                        None => {
                            self.shutdown().await;
                            break;
                        }
                    }
                }
                Some(completion) = channels.completions.recv() => {
                    self.handle_completion(completion).await;
                }
                Some(notice) = channels.notices.recv() => {
                    self.handle_sync_notice(notice).await;
                }
            }
        }

        debug!(session_id = %self.session_id, "Session coordinator stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Configure {
                options,
                config,
                reply,
            } => {
                let result = self.configure(options, *config).await;
                let _ = reply.send(result);
            }
            Command::Start { reply } => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            Command::SubmitFrame(frame) => self.submit_frame(frame).await,
            Command::Pause => self.pause().await,
            Command::Cancel => self.cancel().await,
            Command::RequestSync => self.request_sync().await,
            Command::RequestSnapshotSearch => self.request_snapshot_search().await,
            Command::CancelSnapshotSearch => self.cancel_snapshot_search().await,
            Command::Shutdown { reply } => {
                // Handled by the loop; kept for exhaustiveness
                let _ = reply.send(());
            }
        }
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    async fn configure(&mut self, options: ScanOptions, config: SessionConfig) -> Result<()> {
        self.ensure_not_terminated()?;
        config.validate()?;
        if options.is_empty() {
            return Err(Error::InvalidConfig(
                "scan options must enable at least one outcome kind".to_string(),
            ));
        }

        let pipeline = RecognitionPipeline::new(
            self.services.backend.clone(),
            config.pipeline.strategy_order.clone(),
        );
        self.stabilizer.set_policy(config.hysteresis_policy());
        self.lifecycle.set_gate(config.sync_gate());

        let had_task = self.scheduler.cancel_kind(TaskKind::Recognition);
        self.stabilizer.reset();
        self.configured = Some(Configured { options, pipeline });

        info!(
            session_id = %self.session_id,
            kinds = ?options.kinds(),
            hysteresis = ?self.stabilizer.policy(),
            gate = ?self.lifecycle.gate(),
            "Session configured"
        );

        if had_task && self.is_scanning() {
            self.scheduler.request_frame();
        }
        self.announce_status().await;
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        self.ensure_not_terminated()?;
        if self.configured.is_none() {
            return Err(Error::NotConfigured);
        }
        if self.started {
            debug!(session_id = %self.session_id, "Session already started");
            return Ok(());
        }

        if let Err(reason) = self.services.backend.check_compatibility() {
            self.terminate(FatalKind::DeviceIncompatible, reason.clone()).await;
            return Err(Error::DeviceIncompatible(reason));
        }

        if !self.store_open {
            match self.services.store.open() {
                Ok(()) => self.store_open = true,
                Err(StoreError::CredentialMismatch) => {
                    let message = StoreError::CredentialMismatch.to_string();
                    self.terminate(FatalKind::CredentialMismatch, message).await;
                    return Err(Error::Store(StoreError::CredentialMismatch));
                }
                Err(e) => {
                    error!(session_id = %self.session_id, error = %e, "Failed to open reference store");
                    return Err(Error::Store(e));
                }
            }
        }

        let record_count = self.services.store.record_count();
        let decision = self.lifecycle.evaluate_start(record_count, self.clock.now());
        self.started = true;

        info!(
            session_id = %self.session_id,
            records = record_count,
            cold_start = self.lifecycle.status().cold_start,
            ?decision,
            "Session started"
        );

        match decision {
            StartDecision::Blocking | StartDecision::Background => self.begin_sync().await,
            StartDecision::Skip => {
                debug!(session_id = %self.session_id, "Sync skipped, last sync is recent");
            }
            StartDecision::InProgress => {}
        }

        if self.is_scanning() {
            self.scheduler.request_frame();
        }
        self.announce_status().await;
        Ok(())
    }

    async fn submit_frame(&mut self, frame: Frame) {
        if !self.is_scanning() {
            trace!(session_id = %self.session_id, "Not scanning, frame released");
            return;
        }

        if self.snapshot.wants_frame() {
            if self.scheduler.is_busy() {
                trace!("Snapshot search waiting for the in-flight task");
                return;
            }
            let job = remote_search_job(self.services.backend.clone());
            if let Submission::Accepted(task_id) = self.scheduler.submit(TaskKind::Snapshot, frame, job) {
                self.snapshot.mark_running();
                info!(session_id = %self.session_id, %task_id, "Snapshot search started");
            }
            return;
        }

        // The search completion pulls the next frame
        if self.snapshot.is_running() {
            trace!("Snapshot search running, frame not scanned");
            return;
        }

        let Some(configured) = &self.configured else {
            return;
        };
        let pipeline = configured.pipeline.clone();
        let options = configured.options;
        let prior = self.stabilizer.lock().clone();

        self.scheduler.submit(TaskKind::Recognition, frame, move |frame, token| {
            TaskOutput::Recognition(pipeline.run(frame, &prior, options, token))
        });
    }

    async fn pause(&mut self) {
        let search_cleared = self.snapshot.clear();
        if search_cleared {
            self.emit(|timestamp| ScanEvent::SnapshotSearchStateChanged {
                searching: false,
                timestamp,
            });
        }
        self.scheduler.cancel();

        let was_started = std::mem::replace(&mut self.started, false);
        if was_started {
            info!(session_id = %self.session_id, "Session paused");
        }
        if was_started || search_cleared {
            self.announce_status().await;
        }
    }

    async fn cancel(&mut self) {
        let kind = self.scheduler.in_flight_kind();
        if !self.scheduler.cancel() {
            return;
        }
        if kind == Some(TaskKind::Snapshot) && self.snapshot.clear() {
            self.emit(|timestamp| ScanEvent::SnapshotSearchStateChanged {
                searching: false,
                timestamp,
            });
            self.announce_status().await;
        }
    }

    async fn request_sync(&mut self) {
        if self.terminated.is_some() || !self.store_open {
            debug!(session_id = %self.session_id, "Sync request ignored, session not started");
            return;
        }
        if self.lifecycle.status().syncing {
            debug!(session_id = %self.session_id, "Sync already running");
            return;
        }
        self.begin_sync().await;
    }

    async fn request_snapshot_search(&mut self) {
        if !self.is_scanning() {
            debug!(session_id = %self.session_id, "Snapshot search ignored, not scanning");
            return;
        }
        if !self.snapshot.request() {
            debug!(session_id = %self.session_id, "Snapshot search already pending");
            return;
        }
        self.stabilizer.reset();
        self.emit(|timestamp| ScanEvent::SnapshotSearchStateChanged {
            searching: true,
            timestamp,
        });
        self.announce_status().await;
    }

    async fn cancel_snapshot_search(&mut self) {
        if !self.snapshot.is_searching() {
            return;
        }
        if self.scheduler.cancel_kind(TaskKind::Snapshot) && self.is_scanning() {
            self.scheduler.request_frame();
        }
        self.snapshot.clear();
        info!(session_id = %self.session_id, "Snapshot search cancelled");
        self.emit(|timestamp| ScanEvent::SnapshotSearchStateChanged {
            searching: false,
            timestamp,
        });
        self.announce_status().await;
    }

    async fn shutdown(&mut self) {
        self.scheduler.cancel();
        self.snapshot.clear();
        if self.lifecycle.abandon() {
            self.services.store.cancel_sync();
        }
        if self.store_open {
            self.services.store.close();
            self.store_open = false;
        }
        self.started = false;
        self.refresh_status().await;
        info!(session_id = %self.session_id, "Session shut down");
    }

    // ---------------------------------------------------------------------
    // Worker completions
    // ---------------------------------------------------------------------

    async fn handle_completion(&mut self, completion: TaskCompletion) {
        let Some(output) = self.scheduler.complete(completion) else {
            return;
        };

        match output {
            TaskOutput::Recognition(Ok(outcome)) => self.apply_outcome(&outcome).await,
            TaskOutput::Recognition(Err(PipelineFault::Cancelled)) => {}
            TaskOutput::Recognition(Err(PipelineFault::Misuse(e))) => {
                error!(session_id = %self.session_id, error = %e, "Recognition backend misuse");
                let message = e.to_string();
                self.emit(|timestamp| ScanEvent::DeveloperFault { message, timestamp });
                self.apply_outcome(&RecognitionOutcome::None).await;
            }
            TaskOutput::Snapshot(result) => {
                if !self.snapshot.is_running() {
                    return;
                }
                self.snapshot.clear();
                let (outcome, error) = snapshot_outcome(result);
                match &error {
                    Some(message) => warn!(session_id = %self.session_id, error = %message, "Snapshot search failed"),
                    None => info!(session_id = %self.session_id, outcome = %outcome, "Snapshot search completed"),
                }

                self.emit(|timestamp| ScanEvent::SnapshotSearchStateChanged {
                    searching: false,
                    timestamp,
                });
                let published = outcome.clone();
                self.emit(|timestamp| ScanEvent::SnapshotSearchCompleted {
                    outcome: published,
                    error,
                    timestamp,
                });
                if outcome.is_found() {
                    self.apply_outcome(&outcome).await;
                }
                self.announce_status().await;
            }
        }
    }

    async fn apply_outcome(&mut self, outcome: &RecognitionOutcome) {
        let now = self.clock.now();
        if let Some(lock) = self.stabilizer.apply(outcome, now) {
            self.refresh_status().await;
            self.emit(|timestamp| ScanEvent::LockChanged { lock, timestamp });
        }
    }

    // ---------------------------------------------------------------------
    // Sync
    // ---------------------------------------------------------------------

    async fn begin_sync(&mut self) {
        let Some(generation) = self.lifecycle.begin_sync() else {
            return;
        };
        info!(
            session_id = %self.session_id,
            generation,
            blocking = self.lifecycle.is_blocking(),
            "Sync started"
        );
        self.emit_sync_state().await;
        self.services
            .store
            .start_sync(SyncObserver::new(generation, self.sync_tx.clone()));
    }

    async fn handle_sync_notice(&mut self, notice: SyncNotice) {
        let generation = notice.generation;
        match notice.kind {
            SyncNoticeKind::Started => {
                debug!(session_id = %self.session_id, generation, "Store reports sync running");
            }
            SyncNoticeKind::Progress { current, total } => {
                if let Some(blocking) = self.lifecycle.on_progress(generation) {
                    trace!(current, total, "Sync progress");
                    self.emit(|timestamp| ScanEvent::SyncProgress {
                        current,
                        total,
                        blocking,
                        timestamp,
                    });
                }
            }
            SyncNoticeKind::Completed => {
                let record_count = self.services.store.record_count();
                let now = self.clock.now();
                if let Some(SyncResolution::Ready { unblocked }) =
                    self.lifecycle.on_completed(generation, record_count, now)
                {
                    info!(session_id = %self.session_id, records = record_count, "Sync completed");
                    self.emit_sync_state().await;
                    if unblocked {
                        self.resume_after_sync().await;
                    }
                }
            }
            SyncNoticeKind::Failed(sync_error) => {
                let record_count = self.services.store.record_count();
                match self.lifecycle.on_failed(generation, &sync_error, record_count) {
                    Some(SyncResolution::Cancelled) => {
                        debug!(session_id = %self.session_id, "Sync cancelled by store");
                        self.emit_sync_state().await;
                    }
                    Some(SyncResolution::Failed {
                        cold_start,
                        fatal,
                        message,
                    }) => {
                        self.handle_sync_failure(cold_start, fatal, message, record_count, &sync_error)
                            .await;
                    }
                    Some(SyncResolution::Ready { .. }) | None => {
                        trace!(generation, "Ignoring stale sync failure");
                    }
                }
            }
        }
    }

    async fn handle_sync_failure(
        &mut self,
        cold_start: bool,
        fatal: bool,
        message: String,
        record_count: u64,
        sync_error: &SyncError,
    ) {
        warn!(
            session_id = %self.session_id,
            error = %sync_error,
            cold_start,
            records = record_count,
            "Sync failed"
        );
        self.emit_sync_state().await;

        if fatal {
            self.terminate(FatalKind::EmptyDatabaseAfterSync, message).await;
            return;
        }

        if cold_start {
            self.emit(|timestamp| ScanEvent::SyncWarning {
                message,
                record_count,
                timestamp,
            });
        }

        let unblocked = self.lifecycle.recover(self.services.store.record_count());
        self.emit_sync_state().await;
        if unblocked {
            self.resume_after_sync().await;
        }
    }

    /// Cold-start hold lifted
    async fn resume_after_sync(&mut self) {
        if self.is_scanning() {
            info!(session_id = %self.session_id, "Scanning enabled");
            self.scheduler.request_frame();
        }
        self.announce_status().await;
    }

    async fn emit_sync_state(&mut self) {
        self.refresh_status().await;
        let phase = self.lifecycle.phase();
        let status = self.lifecycle.status().clone();
        self.emit(|timestamp| ScanEvent::SyncStateChanged {
            phase,
            status,
            timestamp,
        });
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn is_scanning(&self) -> bool {
        self.started && self.terminated.is_none() && self.lifecycle.allows_scanning()
    }

    fn ensure_not_terminated(&self) -> Result<()> {
        match &self.terminated {
            Some((kind, message)) => Err(Error::Fatal {
                kind: *kind,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Enter the terminal state and report it
    async fn terminate(&mut self, kind: FatalKind, message: String) {
        error!(session_id = %self.session_id, %kind, message = %message, "Fatal session error");
        self.scheduler.cancel();
        self.snapshot.clear();
        self.started = false;
        self.terminated = Some((kind, message.clone()));
        self.refresh_status().await;
        self.emit(|timestamp| ScanEvent::FatalError {
            kind,
            message,
            timestamp,
        });
    }

    fn emit(&self, build: impl FnOnce(chrono::DateTime<chrono::Utc>) -> ScanEvent) {
        self.events.emit_lossy(build(self.clock.now()));
    }

    fn snapshot_status(&self) -> SessionStatus {
        let mut status = SessionStatus::new(self.session_id);
        status.scanning = self.is_scanning();
        status.ready = self.lifecycle.is_ready();
        status.searching = self.snapshot.is_searching();
        status.sync_phase = self.lifecycle.phase();
        status.sync = self.lifecycle.status().clone();
        status.lock = self.stabilizer.lock().clone();
        if let Some(configured) = &self.configured {
            status.set_scan_options(configured.options);
        }
        status
    }

    /// Update the shared snapshot without announcing it
    async fn refresh_status(&self) {
        let status = self.snapshot_status();
        *self.shared_status.write().await = status;
    }

    /// Update the shared snapshot and publish `ScanningStateChanged`
    async fn announce_status(&self) {
        let status = self.snapshot_status();
        *self.shared_status.write().await = status.clone();
        self.emit(|timestamp| ScanEvent::ScanningStateChanged { status, timestamp });
    }
}
