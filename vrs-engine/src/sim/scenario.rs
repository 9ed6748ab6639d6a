//! Replay scripts for the demo binary
//!
//! ```toml
//! [store]
//! records = 0
//!
//! [[store.syncs]]
//! result = "succeed"
//! records = 50
//!
//! [[steps]]
//! action = "frames"
//! labels = ["image:poster", "image:poster", "none", "none"]
//!
//! [[steps]]
//! action = "advance_clock"
//! secs = 7200
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{SimBackend, SimStore, SyncScript};
use crate::error::Result;

fn default_step_delay_ms() -> u64 {
    10
}

fn default_compatible() -> bool {
    true
}

fn default_frame_timeout_ms() -> u64 {
    5_000
}

/// Scripted collaborators plus the actions to replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub store: StoreScript,

    /// Device passes the backend compatibility check
    #[serde(default = "default_compatible")]
    pub compatible: bool,

    /// How long to wait for the session to ask for the next frame
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,

    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreScript {
    /// Records present before the first sync
    #[serde(default)]
    pub records: u64,

    #[serde(default)]
    pub credential_mismatch: bool,

    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    /// Consumed one per sync, in order
    #[serde(default)]
    pub syncs: Vec<SyncScript>,
}

impl Default for StoreScript {
    fn default() -> Self {
        Self {
            records: 0,
            credential_mismatch: false,
            step_delay_ms: default_step_delay_ms(),
            syncs: Vec::new(),
        }
    }
}

/// One replayed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Answer the next frame requests with these labels, in order
    Frames { labels: Vec<String> },
    Start,
    Pause,
    Cancel,
    Sync,
    Snapshot,
    CancelSnapshot,
    Wait { ms: u64 },
    /// Move the session clock forward
    AdvanceClock { secs: i64 },
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            store: StoreScript::default(),
            compatible: default_compatible(),
            frame_timeout_ms: default_frame_timeout_ms(),
            steps: Vec::new(),
        }
    }
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(vrs_common::config::load_toml(path)?)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn backend(&self) -> SimBackend {
        if self.compatible {
            SimBackend::new()
        } else {
            SimBackend::incompatible()
        }
    }

    pub fn store(&self) -> SimStore {
        let store = SimStore::new(self.store.records)
            .with_syncs(self.store.syncs.iter().cloned())
            .with_step_delay(Duration::from_millis(self.store.step_delay_ms));
        if self.store.credential_mismatch {
            store.with_credential_mismatch()
        } else {
            store
        }
    }
}
