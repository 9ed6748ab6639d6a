//! Scripted stand-ins for the external collaborators
//!
//! Used by the `vrs-demo` binary to replay a [`Scenario`] against a real
//! [`Session`](crate::session::Session). Frames carry a UTF-8 label in
//! their pixel bytes which [`SimBackend`] interprets:
//!
//! | label            | verify / search / decode              |
//! |------------------|---------------------------------------|
//! | `image:<id>`     | matches image `<id>`                  |
//! | `remote:<id>`    | only found by the remote search       |
//! | `ean8:<text>`    | EAN-8 barcode (`ean13`, `qrcode` alike) |
//! | `none` / other   | nothing found                         |
//! | `error`          | every call fails transiently          |
//! | `misuse`         | every call reports backend misuse     |

mod backend;
mod scenario;
mod store;

pub use backend::{FrameLabel, SimBackend};
pub use scenario::{Scenario, ScenarioStep, StoreScript};
pub use store::{SimStore, SimSyncFailure, SyncScript};

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use vrs_common::Clock;

use crate::backend::FrameSource;
use crate::frame::{Frame, FrameError, FrameLayout, FramePool, PixelFormat, Rotation};

/// Frame source that forwards each request to a channel
#[derive(Debug)]
pub struct SimFrameSource {
    requests: mpsc::UnboundedSender<()>,
    requested: AtomicU64,
}

impl SimFrameSource {
    /// Returns the source and the receiving end of its frame requests
    pub fn new() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (requests, rx) = mpsc::unbounded_channel();
        (
            Self {
                requests,
                requested: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Total frame requests received
    pub fn requested(&self) -> u64 {
        self.requested.load(Ordering::SeqCst)
    }
}

impl FrameSource for SimFrameSource {
    fn request_frame(&self) {
        self.requested.fetch_add(1, Ordering::SeqCst);
        // Receiver gone means the replay loop has finished
        let _ = self.requests.send(());
    }
}

/// System clock that can be pushed forward
///
/// Time keeps flowing between jumps, so time-based hysteresis still
/// releases locks during a replay.
#[derive(Debug)]
pub struct SimClock {
    offset: Mutex<Duration>,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            offset: Mutex::new(Duration::zero()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> DateTime<Utc> {
        vrs_common::time::now() + *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Build a one-row grayscale frame whose pixels spell `label`
pub fn label_frame(
    pool: &FramePool,
    label: &str,
    captured_at: DateTime<Utc>,
) -> Result<Frame, FrameError> {
    let label = if label.is_empty() { "none" } else { label };
    let buffer = pool.acquire_copy(label.as_bytes());
    let layout = FrameLayout::packed(label.len() as u32, 1, PixelFormat::Gray8);
    Frame::new(buffer, layout, Rotation::Deg0, captured_at)
}
