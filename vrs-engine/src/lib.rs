//! # VRS Engine (vrs-engine)
//!
//! Continuous visual-recognition session engine.
//!
//! **Purpose:** Pull camera frames one at a time, run a multi-strategy
//! recognition pipeline over each (lock verification, image search, barcode
//! decoding), stabilize the per-frame outcomes into one displayed lock, and
//! coordinate scanning with the sync lifecycle of the local reference
//! database.
//!
//! **Architecture:** A single coordinator task owns all session state.
//! Recognition runs on blocking workers, at most one at a time. Status is
//! published on a broadcast [`EventBus`](vrs_common::EventBus).

pub mod backend;
pub mod config;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod scheduler;
pub mod session;
pub mod sim;
pub mod snapshot;
pub mod stabilizer;
pub mod sync;

pub use error::{Error, Result};
pub use session::Session;
