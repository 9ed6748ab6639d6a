//! Result stabilizer
//!
//! Turns the flickering per-frame outcomes into one displayed lock.
//! Acquisition is instant, release is delayed by a [`HysteresisPolicy`].
//!
//! | state                | outcome            | next state                 |
//! |----------------------|--------------------|----------------------------|
//! | `Empty`              | `o ≠ None`         | `Locked(o, 0, now)`        |
//! | `Locked(o, _, _)`    | `o`                | `Locked(o, 0, now)`        |
//! | `Locked(o, _, _)`    | `p ≠ o, p ≠ None`  | `Locked(p, 0, now)`        |
//! | `Locked(o, m, t)`    | `None`             | policy: keep or `Empty`    |

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use vrs_common::{LockState, RecognitionOutcome};

/// When a lock that stopped being confirmed is dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HysteresisPolicy {
    /// Drop after `threshold` consecutive misses
    MissCounter { threshold: u32 },
    /// Drop once the lock has not been confirmed for longer than `drop_window`
    ///
    /// Misses are still counted in the lock's `miss_count` for diagnostics;
    /// the count never decides the release.
    Timeout { drop_window: Duration },
}

impl Default for HysteresisPolicy {
    fn default() -> Self {
        HysteresisPolicy::MissCounter { threshold: 2 }
    }
}

impl HysteresisPolicy {
    /// Decide whether a lock with `miss_count` misses (this one included)
    /// and last confirmation at `last_seen_at` is released at `now`
    pub fn should_release(
        &self,
        miss_count: u32,
        last_seen_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        match *self {
            HysteresisPolicy::MissCounter { threshold } => miss_count >= threshold,
            HysteresisPolicy::Timeout { drop_window } => now - last_seen_at > drop_window,
        }
    }
}

/// Lock state machine
#[derive(Debug, Clone)]
pub struct ResultStabilizer {
    policy: HysteresisPolicy,
    state: LockState,
}

impl ResultStabilizer {
    pub fn new(policy: HysteresisPolicy) -> Self {
        Self {
            policy,
            state: LockState::Empty,
        }
    }

    pub fn policy(&self) -> HysteresisPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: HysteresisPolicy) {
        self.policy = policy;
    }

    pub fn lock(&self) -> &LockState {
        &self.state
    }

    /// Apply one raw outcome
    ///
    /// Returns the new state only when the visible value changed.
    pub fn apply(&mut self, outcome: &RecognitionOutcome, now: DateTime<Utc>) -> Option<LockState> {
        let next = self.transition(outcome, now);
        let changed = !next.same_visible_value(&self.state);
        self.state = next;

        if changed {
            match &self.state {
                LockState::Locked { outcome, .. } => info!(outcome = %outcome, "Lock acquired"),
                LockState::Empty => info!("Lock released"),
            }
            Some(self.state.clone())
        } else {
            None
        }
    }

    fn transition(&self, outcome: &RecognitionOutcome, now: DateTime<Utc>) -> LockState {
        if outcome.is_found() {
            return LockState::locked(outcome.clone(), now);
        }

        match &self.state {
            LockState::Empty => LockState::Empty,
            LockState::Locked {
                outcome: locked,
                miss_count,
                last_seen_at,
            } => {
                let misses = miss_count.saturating_add(1);
                if self.policy.should_release(misses, *last_seen_at, now) {
                    LockState::Empty
                } else {
                    debug!(outcome = %locked, misses, "Lock kept through miss");
                    LockState::Locked {
                        outcome: locked.clone(),
                        miss_count: misses,
                        last_seen_at: *last_seen_at,
                    }
                }
            }
        }
    }

    /// Clear the lock without reporting it
    ///
    /// Returns true if a lock was held.
    pub fn reset(&mut self) -> bool {
        let was_locked = self.state.is_locked();
        self.state = LockState::Empty;
        was_locked
    }
}

impl Default for ResultStabilizer {
    fn default() -> Self {
        Self::new(HysteresisPolicy::default())
    }
}
