//! Error types for vrs-engine
//!
//! Session-level errors returned by the facade. Recognition-strategy errors
//! never reach this type; they are absorbed inside the pipeline.

use thiserror::Error;
use vrs_common::FatalKind;

use crate::backend::StoreError;

/// Main error type for vrs-engine
#[derive(Error, Debug)]
pub enum Error {
    /// `start()` called before `configure()`
    #[error("Session not configured")]
    NotConfigured,

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Backend compatibility check failed
    #[error("Device incompatible: {0}")]
    DeviceIncompatible(String),

    /// Reference store could not be opened
    #[error("Reference store error: {0}")]
    Store(#[from] StoreError),

    /// Session hit a terminating condition
    #[error("Fatal session error ({kind}): {message}")]
    Fatal { kind: FatalKind, message: String },

    /// Coordinator has shut down
    #[error("Session closed")]
    SessionClosed,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<vrs_common::Error> for Error {
    fn from(err: vrs_common::Error) -> Self {
        match err {
            vrs_common::Error::Io(e) => Error::Io(e),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Convenience Result type using vrs-engine Error
pub type Result<T> = std::result::Result<T, Error>;
