//! External collaborator contracts
//!
//! The engine consumes recognition, the reference store and the camera
//! only through these traits. Implementations are injected into
//! [`Session::new`](crate::session::Session::new) as a [`ScanServices`]
//! bundle, one per session.

use std::sync::Arc;
use thiserror::Error;
use vrs_common::{BarcodeKind, ScanOptions};

use crate::frame::Frame;
use crate::sync::SyncObserver;

/// Recognition backend call failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Single call failed; absorbed as "nothing found" for that strategy
    #[error("Transient recognition error: {0}")]
    Transient(String),

    /// Programming error in how the backend is driven
    #[error("Backend misuse: {0}")]
    Misuse(String),

    /// Scanning attempted with no reference records loaded
    #[error("Reference database is empty")]
    EmptyDatabase,
}

impl BackendError {
    /// Misuse-class errors are surfaced as developer faults
    pub fn is_misuse(&self) -> bool {
        matches!(self, BackendError::Misuse(_) | BackendError::EmptyDatabase)
    }
}

/// Sync failure reported by the reference store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("No network connection")]
    NoConnection,

    #[error("Network connection too slow")]
    SlowConnection,

    #[error("Sync timed out")]
    Timeout,

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Sync error {code}: {message}")]
    Other { code: i32, message: String },
}

impl SyncError {
    /// Message suitable for showing to an end user
    pub fn user_message(&self) -> String {
        let reason = match self {
            SyncError::NoConnection => "The Internet connection does not work.".to_string(),
            SyncError::SlowConnection => "The Internet connection is too slow.".to_string(),
            SyncError::Timeout => "The operation timed out.".to_string(),
            SyncError::Cancelled => "The synchronization was cancelled.".to_string(),
            SyncError::Other { code, .. } => {
                format!("An internal error occurred (code = {}).", code)
            }
        };
        format!("{} Please try again later.", reason)
    }
}

/// Reference store failure when opening
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// On-disk database was created with different credentials
    #[error("Credentials do not match the stored database")]
    CredentialMismatch,

    #[error("Reference store unavailable: {0}")]
    Unavailable(String),
}

/// Stateless per-frame recognition operations
///
/// Calls block; the engine only invokes them from a blocking worker.
pub trait RecognitionBackend: Send + Sync {
    /// Cheap check that `frame` still shows the image `expected_id`
    fn verify(&self, frame: &Frame, expected_id: &str) -> Result<bool, BackendError>;

    /// Offline image search against the local reference database
    fn search(&self, frame: &Frame) -> Result<Option<String>, BackendError>;

    /// Decode a barcode of one of the kinds in `formats`
    fn decode_barcode(
        &self,
        frame: &Frame,
        formats: ScanOptions,
    ) -> Result<Option<(BarcodeKind, String)>, BackendError>;

    /// Precondition checked before a session may start
    fn check_compatibility(&self) -> Result<(), String> {
        Ok(())
    }

    /// One-shot online image search
    fn remote_search(&self, _frame: &Frame) -> Result<Option<String>, BackendError> {
        Err(BackendError::Transient(
            "remote search not supported by this backend".to_string(),
        ))
    }
}

/// Local reference database and its sync service
///
/// Methods are called from the session coordinator and must not block;
/// `start_sync` runs the sync elsewhere and reports through the observer.
pub trait ReferenceStore: Send + Sync {
    fn open(&self) -> Result<(), StoreError>;

    fn close(&self);

    fn record_count(&self) -> u64;

    fn start_sync(&self, observer: SyncObserver);

    fn cancel_sync(&self);
}

/// Camera feed, pulled one frame at a time
pub trait FrameSource: Send + Sync {
    /// Ask for one frame; it arrives later through
    /// [`Session::submit_frame`](crate::session::Session::submit_frame)
    fn request_frame(&self);
}

/// External service handles injected into a session
#[derive(Clone)]
pub struct ScanServices {
    pub backend: Arc<dyn RecognitionBackend>,
    pub store: Arc<dyn ReferenceStore>,
    pub frames: Arc<dyn FrameSource>,
}

impl ScanServices {
    pub fn new(
        backend: Arc<dyn RecognitionBackend>,
        store: Arc<dyn ReferenceStore>,
        frames: Arc<dyn FrameSource>,
    ) -> Self {
        Self {
            backend,
            store,
            frames,
        }
    }
}
