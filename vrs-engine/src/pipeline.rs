//! Recognition pipeline
//!
//! One blocking pass over one frame. Steps run in order and the first
//! success wins:
//!
//! 1. Lock verification, when a lock is held (always first)
//! 2. The configured strategies, by default image search then barcode decode
//!
//! Transient backend errors count as "nothing found" for the step that
//! raised them. Misuse-class errors end the pass as a [`PipelineFault`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use vrs_common::{LockState, RecognitionOutcome, ScanOptions};

use crate::backend::{BackendError, RecognitionBackend};
use crate::frame::Frame;

/// Full recognition strategy run after lock verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ImageSearch,
    BarcodeDecode,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::ImageSearch => write!(f, "image_search"),
            Strategy::BarcodeDecode => write!(f, "barcode_decode"),
        }
    }
}

/// Pass ended without an outcome
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineFault {
    /// Task was cancelled; never reported
    #[error("Recognition cancelled")]
    Cancelled,

    /// Backend reported a misuse-class error
    #[error("{0}")]
    Misuse(BackendError),
}

/// Ordered, short-circuiting recognition strategies
#[derive(Clone)]
pub struct RecognitionPipeline {
    backend: Arc<dyn RecognitionBackend>,
    order: Vec<Strategy>,
}

impl RecognitionPipeline {
    pub fn new(backend: Arc<dyn RecognitionBackend>, order: Vec<Strategy>) -> Self {
        Self { backend, order }
    }

    pub fn order(&self) -> &[Strategy] {
        &self.order
    }

    /// Run one pass; blocks on backend calls
    ///
    /// `cancel` is checked before every step.
    pub fn run(
        &self,
        frame: &Frame,
        prior: &LockState,
        options: ScanOptions,
        cancel: &CancellationToken,
    ) -> Result<RecognitionOutcome, PipelineFault> {
        if let Some(locked) = prior.outcome() {
            check_cancelled(cancel)?;
            if self.verify_lock(frame, locked)? {
                trace!(outcome = %locked, "Lock verified");
                return Ok(locked.clone());
            }
            trace!(outcome = %locked, "Lock verification failed, running full search");
        }

        for strategy in &self.order {
            check_cancelled(cancel)?;
            if let Some(outcome) = self.run_strategy(*strategy, frame, options)? {
                return Ok(outcome);
            }
        }

        Ok(RecognitionOutcome::None)
    }

    fn verify_lock(
        &self,
        frame: &Frame,
        locked: &RecognitionOutcome,
    ) -> Result<bool, PipelineFault> {
        match locked {
            RecognitionOutcome::None => Ok(false),
            RecognitionOutcome::Image { id } => {
                let verified = absorb("verify", self.backend.verify(frame, id))?;
                Ok(verified.unwrap_or(false))
            }
            RecognitionOutcome::Barcode { kind, text } => {
                let decoded = absorb(
                    "verify_barcode",
                    self.backend.decode_barcode(frame, kind.format_flag()),
                )?;
                Ok(matches!(
                    decoded.flatten(),
                    Some((found_kind, found_text)) if found_kind == *kind && found_text == *text
                ))
            }
        }
    }

    fn run_strategy(
        &self,
        strategy: Strategy,
        frame: &Frame,
        options: ScanOptions,
    ) -> Result<Option<RecognitionOutcome>, PipelineFault> {
        match strategy {
            Strategy::ImageSearch => {
                if !options.image_enabled() {
                    return Ok(None);
                }
                let found = absorb("image_search", self.backend.search(frame))?;
                Ok(found.flatten().map(RecognitionOutcome::image))
            }
            Strategy::BarcodeDecode => {
                let formats = options.barcode_formats();
                if formats.is_empty() {
                    return Ok(None);
                }
                let found = absorb("barcode_decode", self.backend.decode_barcode(frame, formats))?;
                Ok(found
                    .flatten()
                    .map(|(kind, text)| RecognitionOutcome::barcode(kind, text)))
            }
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), PipelineFault> {
    if cancel.is_cancelled() {
        Err(PipelineFault::Cancelled)
    } else {
        Ok(())
    }
}

/// Fold a transient error into "no result" for this step
fn absorb<T>(step: &'static str, result: Result<T, BackendError>) -> Result<Option<T>, PipelineFault> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_misuse() => Err(PipelineFault::Misuse(e)),
        Err(e) => {
            debug!(step, error = %e, "Recognition step failed, treating as no result");
            Ok(None)
        }
    }
}
