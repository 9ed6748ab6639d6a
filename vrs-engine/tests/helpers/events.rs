//! Session event stream access for tests

use tokio::sync::broadcast::{self, error::TryRecvError};
use vrs_common::{LockState, ScanEvent};

use super::TEST_TIMEOUT;

/// Subscription that panics instead of hanging
pub struct EventLog {
    rx: broadcast::Receiver<ScanEvent>,
}

impl EventLog {
    pub fn new(rx: broadcast::Receiver<ScanEvent>) -> Self {
        Self { rx }
    }

    /// Next event, whatever it is
    pub async fn next(&mut self) -> ScanEvent {
        match tokio::time::timeout(TEST_TIMEOUT, self.rx.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => panic!("Event stream failed: {}", e),
            Err(_) => panic!("No event within {:?}", TEST_TIMEOUT),
        }
    }

    /// Skip events until `pick` accepts one
    pub async fn expect<T>(&mut self, what: &str, mut pick: impl FnMut(&ScanEvent) -> Option<T>) -> T {
        let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, self.rx.recv()).await {
                Ok(Ok(event)) => {
                    if let Some(found) = pick(&event) {
                        return found;
                    }
                }
                Ok(Err(e)) => panic!("Event stream failed while waiting for {}: {}", what, e),
                Err(_) => panic!("Timed out waiting for {}", what),
            }
        }
    }

    /// Skip events until one of `event_type` arrives
    pub async fn expect_type(&mut self, event_type: &str) -> ScanEvent {
        self.expect(event_type, |event| {
            (event.event_type() == event_type).then(|| event.clone())
        })
        .await
    }

    pub async fn expect_lock(&mut self) -> LockState {
        self.expect("LockChanged", |event| match event {
            ScanEvent::LockChanged { lock, .. } => Some(lock.clone()),
            _ => None,
        })
        .await
    }

    /// Everything already delivered, without waiting
    pub fn drain(&mut self) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
                Err(TryRecvError::Lagged(skipped)) => {
                    panic!("Event log lagged, {} events lost", skipped)
                }
            }
        }
    }
}

/// Count events of one type
pub fn count(events: &[ScanEvent], event_type: &str) -> usize {
    events
        .iter()
        .filter(|event| event.event_type() == event_type)
        .count()
}

/// Event type names, in order
pub fn types(events: &[ScanEvent]) -> Vec<&str> {
    events.iter().map(|event| event.event_type()).collect()
}
