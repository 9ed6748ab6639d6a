//! Test helpers for vrs-engine integration tests
//!
//! - Fakes for the external collaborators (gated backend, controllable
//!   reference store, recording frame source)
//! - `TestRig`: a session wired to those fakes and a manual clock
//! - `EventLog`: timeout-guarded access to the session event stream

#![allow(dead_code)]

pub mod events;
pub mod fakes;

pub use events::EventLog;
pub use fakes::{ControlledStore, GatedBackend, RecordingFrameSource, TestRig};

use std::time::Duration;

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds or the test timeout expires
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
