//! Session facade
//!
//! The only surface a UI layer talks to. Every call is forwarded to the
//! session coordinator task; state is never touched from the caller's
//! thread.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vrs_common::{ScanOptions, SystemClock};
//! use vrs_engine::backend::ScanServices;
//! use vrs_engine::config::SessionConfig;
//! use vrs_engine::session::Session;
//!
//! # async fn run(services: ScanServices) -> vrs_engine::Result<()> {
//! let session = Session::new(services, Arc::new(SystemClock));
//! let mut events = session.subscribe();
//!
//! session.configure(ScanOptions::default(), SessionConfig::default()).await?;
//! session.start().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.event_type());
//! }
//! # Ok(())
//! # }
//! ```

mod coordinator;

use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;
use vrs_common::{Clock, EventBus, ScanEvent, ScanOptions, SessionStatus};

use crate::backend::ScanServices;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::frame::Frame;
use coordinator::Coordinator;

/// Default broadcast capacity of the session event bus
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Requests forwarded to the coordinator
#[derive(Debug)]
pub(crate) enum Command {
    Configure {
        options: ScanOptions,
        config: Box<SessionConfig>,
        reply: oneshot::Sender<Result<()>>,
    },
    Start {
        reply: oneshot::Sender<Result<()>>,
    },
    SubmitFrame(Frame),
    Pause,
    Cancel,
    RequestSync,
    RequestSnapshotSearch,
    CancelSnapshotSearch,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running recognition session
///
/// Dropping the handle stops the coordinator and closes the store.
pub struct Session {
    session_id: Uuid,
    commands: mpsc::UnboundedSender<Command>,
    events: Arc<EventBus>,
    status: Arc<RwLock<SessionStatus>>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Spawn a session coordinator on the current tokio runtime
    pub fn new(services: ScanServices, clock: Arc<dyn Clock>) -> Self {
        Self::with_event_capacity(services, clock, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(
        services: ScanServices,
        clock: Arc<dyn Clock>,
        event_capacity: usize,
    ) -> Self {
        let session_id = Uuid::new_v4();
        let events = Arc::new(EventBus::new(event_capacity));
        let status = Arc::new(RwLock::new(SessionStatus::new(session_id)));
        let (commands, command_rx) = mpsc::unbounded_channel();

        let (coordinator, channels) = Coordinator::new(
            session_id,
            services,
            clock,
            events.clone(),
            status.clone(),
            command_rx,
        );
        let handle = tokio::spawn(coordinator.run(channels));

        Self {
            session_id,
            commands,
            events,
            status,
            coordinator: Mutex::new(Some(handle)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.session_id
    }

    /// Set scan options and session policies; required before `start()`
    ///
    /// Reconfiguring a running session cancels the in-flight recognition
    /// task and clears the lock.
    pub async fn configure(&self, options: ScanOptions, config: SessionConfig) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Configure {
            options,
            config: Box::new(config),
            reply,
        })?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Begin pulling frames; evaluates cold/warm start and sync gating
    pub async fn start(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { reply })?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Deliver a frame from the frame source
    ///
    /// Dropped (and released) if a task is in flight or scanning is off.
    pub fn submit_frame(&self, frame: Frame) {
        self.send_lossy(Command::SubmitFrame(frame));
    }

    /// Stop pulling frames and cancel any in-flight task; idempotent
    pub fn pause(&self) {
        self.send_lossy(Command::Pause);
    }

    /// Cancel the in-flight task without requesting a new frame
    ///
    /// The session stays started; the next submitted frame is accepted.
    pub fn cancel(&self) {
        self.send_lossy(Command::Cancel);
    }

    /// Manual sync; no-op if one is already running
    pub fn request_sync(&self) {
        self.send_lossy(Command::RequestSync);
    }

    /// Send the next frame to the remote search
    pub fn request_snapshot_search(&self) {
        self.send_lossy(Command::RequestSnapshotSearch);
    }

    pub fn cancel_snapshot_search(&self) {
        self.send_lossy(Command::CancelSnapshotSearch);
    }

    /// Latest status snapshot
    pub async fn status(&self) -> SessionStatus {
        self.status.read().await.clone()
    }

    /// Subscribe to session events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Stop the coordinator, cancel any sync and close the store
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }

        let handle = self
            .coordinator
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::SessionClosed)
    }

    fn send_lossy(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!(session_id = %self.session_id, "Session closed, command dropped");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("subscribers", &self.events.subscriber_count())
            .finish()
    }
}
