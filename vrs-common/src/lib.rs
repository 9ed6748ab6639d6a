//! # VRS Common Library
//!
//! Shared code for the visual recognition session workspace:
//! - Recognition outcome and scan option types
//! - Lock and sync status types
//! - Event types (ScanEvent enum) and the EventBus
//! - Clock abstraction used for lock timing and sync gating
//! - Configuration file resolution and loading

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{
    BarcodeKind, EventBus, FatalKind, LockState, OutcomeKind, RecognitionOutcome, ScanEvent,
    ScanOptions, SessionStatus, SyncPhase, SyncStatus,
};
pub use time::{Clock, ManualClock, SystemClock};
