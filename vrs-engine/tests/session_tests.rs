//! Session integration tests: scanning, lock stabilization, cancellation
//!
//! Each test drives a real session coordinator through fake collaborators
//! (see `helpers`).

mod helpers;

use helpers::events::{count, types};
use helpers::{wait_until, ControlledStore, GatedBackend, TestRig};
use vrs_common::{BarcodeKind, FatalKind, LockState, OutcomeKind, RecognitionOutcome, ScanEvent};
use vrs_engine::config::{HysteresisKind, SessionConfig};
use vrs_engine::Error;

fn locked_outcome(lock: &LockState) -> RecognitionOutcome {
    lock.outcome().cloned().expect("lock held")
}

// ============================================================================
// Lock stabilization
// ============================================================================

#[tokio::test]
async fn test_two_misses_release_lock_with_single_change() {
    let mut rig = TestRig::with_records(10);
    rig.start_default().await;
    rig.events.drain();

    rig.recognize("image:A").await;
    rig.recognize("none").await;

    let status = rig.status().await;
    assert_eq!(status.lock.outcome(), Some(&RecognitionOutcome::image("A")));
    assert_eq!(status.lock.miss_count(), Some(1));

    rig.recognize("none").await;
    assert_eq!(rig.status().await.lock, LockState::Empty);

    let events = rig.events.drain();
    let locks: Vec<LockState> = events
        .iter()
        .filter_map(|event| match event {
            ScanEvent::LockChanged { lock, .. } => Some(lock.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(locks.len(), 2, "events: {:?}", types(&events));
    assert_eq!(locked_outcome(&locks[0]), RecognitionOutcome::image("A"));
    assert_eq!(locks[1], LockState::Empty);
}

#[tokio::test]
async fn test_confirmation_resets_miss_count_without_event() {
    let mut rig = TestRig::with_records(10);
    rig.start_default().await;

    rig.recognize("image:A").await;
    assert_eq!(
        locked_outcome(&rig.events.expect_lock().await),
        RecognitionOutcome::image("A")
    );

    rig.recognize("none").await;
    rig.recognize("image:A").await;
    rig.recognize("none").await;

    let status = rig.status().await;
    assert_eq!(status.lock.miss_count(), Some(1));
    assert_eq!(count(&rig.events.drain(), "LockChanged"), 0);
}

#[tokio::test]
async fn test_different_value_replaces_lock_immediately() {
    let mut rig = TestRig::with_records(10);
    rig.start_default().await;

    rig.recognize("image:A").await;
    rig.recognize("qrcode:https://example.com").await;

    let first = rig.events.expect_lock().await;
    let second = rig.events.expect_lock().await;
    assert_eq!(locked_outcome(&first), RecognitionOutcome::image("A"));
    assert_eq!(
        locked_outcome(&second),
        RecognitionOutcome::barcode(BarcodeKind::Qrcode, "https://example.com")
    );
    assert_eq!(second.miss_count(), Some(0));
}

#[tokio::test]
async fn test_timeout_policy_releases_after_drop_window() {
    let mut rig = TestRig::with_records(10);
    let mut config = SessionConfig::default();
    config.hysteresis.policy = HysteresisKind::Timeout;
    config.hysteresis.drop_window_ms = 1500;
    rig.configure(config).await;
    rig.session.start().await.expect("start");

    rig.recognize("image:A").await;
    rig.clock.advance(chrono::Duration::seconds(1));
    rig.recognize("none").await;
    rig.recognize("none").await;
    assert!(rig.status().await.lock.is_locked());

    rig.clock.advance(chrono::Duration::seconds(1));
    rig.recognize("none").await;
    assert_eq!(rig.status().await.lock, LockState::Empty);

    let _ = rig.events.expect_lock().await;
    assert_eq!(rig.events.expect_lock().await, LockState::Empty);
}

#[tokio::test]
async fn test_disabled_kinds_are_not_reported() {
    let rig = TestRig::with_records(10);
    let mut config = SessionConfig::default();
    config.scan.enabled = vec![OutcomeKind::Ean8];
    rig.configure(config).await;
    rig.session.start().await.expect("start");

    rig.recognize("image:A").await;
    rig.recognize("qrcode:menu").await;
    assert_eq!(rig.status().await.lock, LockState::Empty);

    rig.recognize("ean8:12345670").await;
    let status = rig.status().await;
    assert_eq!(
        status.lock.outcome(),
        Some(&RecognitionOutcome::barcode(BarcodeKind::Ean8, "12345670"))
    );
    assert!(status.decode_ean8);
    assert!(!status.image_search);
}

#[tokio::test]
async fn test_reconfigure_clears_lock_silently() {
    let mut rig = TestRig::with_records(10);
    rig.start_default().await;

    rig.recognize("image:A").await;
    let _ = rig.events.expect_lock().await;

    rig.configure(SessionConfig::default()).await;
    assert_eq!(rig.status().await.lock, LockState::Empty);
    assert_eq!(count(&rig.events.drain(), "LockChanged"), 0);
}

// ============================================================================
// Frame scheduling
// ============================================================================

#[tokio::test]
async fn test_frames_dropped_while_task_in_flight() {
    let rig = TestRig::with_records(10);
    rig.start_default().await;
    assert_eq!(rig.frames.requests(), 1);

    rig.backend.hold();
    rig.submit("image:A");
    wait_until("worker in backend", || rig.backend.entered() >= 1).await;

    rig.submit("image:B");
    rig.submit("image:C");
    rig.barrier().await;
    assert_eq!(rig.pool.outstanding(), 1);

    rig.backend.release();
    rig.frames.wait_for_requests(2).await;
    rig.barrier().await;

    assert_eq!(rig.backend.entered(), 1);
    assert_eq!(rig.frames.requests(), 2);
    assert_eq!(rig.pool.outstanding(), 0);
    assert_eq!(
        rig.status().await.lock.outcome(),
        Some(&RecognitionOutcome::image("A"))
    );
}

#[tokio::test]
async fn test_cancel_mid_task_accepts_next_frame() {
    let mut rig = TestRig::with_records(10);
    rig.start_default().await;
    let requests_after_start = rig.frames.requests();

    rig.backend.hold();
    rig.submit("image:A");
    wait_until("first worker in backend", || rig.backend.entered() >= 1).await;

    rig.session.cancel();
    rig.barrier().await;
    assert_eq!(rig.frames.requests(), requests_after_start);
    assert!(rig.status().await.scanning);

    // Accepted while the cancelled worker is still blocked
    rig.submit("image:B");
    wait_until("second worker in backend", || rig.backend.entered() >= 2).await;
    assert_eq!(rig.pool.outstanding(), 2);

    rig.backend.release();
    rig.frames.wait_for_requests(requests_after_start + 1).await;
    wait_until("frames released", || rig.pool.outstanding() == 0).await;
    rig.barrier().await;

    let lock = rig.events.expect_lock().await;
    assert_eq!(locked_outcome(&lock), RecognitionOutcome::image("B"));
    assert_eq!(rig.frames.requests(), requests_after_start + 1);
}

#[tokio::test]
async fn test_cancel_without_task_is_noop() {
    let mut rig = TestRig::with_records(10);
    rig.start_default().await;
    rig.events.drain();

    rig.session.cancel();
    rig.barrier().await;

    assert_eq!(rig.frames.requests(), 1);
    assert!(rig.events.drain().is_empty());
}

#[tokio::test]
async fn test_pause_cancels_and_stops_scanning() {
    let mut rig = TestRig::with_records(10);
    rig.start_default().await;
    rig.events.drain();

    rig.backend.hold();
    rig.submit("image:A");
    wait_until("worker in backend", || rig.backend.entered() >= 1).await;

    rig.session.pause();
    let status = rig
        .events
        .expect("paused status", |event| match event {
            ScanEvent::ScanningStateChanged { status, .. } if !status.scanning => {
                Some(status.clone())
            }
            _ => None,
        })
        .await;
    assert!(!status.scanning);

    rig.backend.release();
    wait_until("frame released", || rig.pool.outstanding() == 0).await;

    // Not scanning: frame released without reaching the backend
    rig.submit("image:B");
    rig.session.pause();
    rig.session.start().await.expect("restart");
    assert_eq!(rig.backend.entered(), 1);
    assert_eq!(rig.pool.outstanding(), 0);
    assert_eq!(rig.status().await.lock, LockState::Empty);

    // Restart pulls a fresh frame
    assert_eq!(rig.frames.requests(), 2);
    rig.recognize("image:C").await;
    assert_eq!(
        rig.status().await.lock.outcome(),
        Some(&RecognitionOutcome::image("C"))
    );
}

#[tokio::test]
async fn test_pause_twice_announces_once() {
    let mut rig = TestRig::with_records(10);
    rig.start_default().await;
    rig.events.drain();

    rig.session.pause();
    rig.session.pause();
    rig.session.configure(Default::default(), SessionConfig::default()).await.expect("configure");

    let events = rig.events.drain();
    let paused = events
        .iter()
        .filter(|event| matches!(event, ScanEvent::ScanningStateChanged { status, .. } if !status.scanning))
        .count();
    // One from the first pause, one from the reconfigure
    assert_eq!(paused, 2, "events: {:?}", types(&events));
}

#[tokio::test]
async fn test_pool_outstanding_returns_to_zero() {
    let rig = TestRig::with_records(10);
    rig.start_default().await;

    for label in ["image:A", "none", "error", "ean13:4006381333931", "none", "none"] {
        rig.recognize(label).await;
    }

    assert_eq!(rig.pool.outstanding(), 0);
    assert!(rig.pool.idle() > 0);
}

#[tokio::test]
async fn test_transient_backend_error_counts_as_miss() {
    let rig = TestRig::with_records(10);
    rig.start_default().await;

    rig.recognize("image:A").await;
    rig.recognize("error").await;

    let status = rig.status().await;
    assert!(status.lock.is_locked());
    assert_eq!(status.lock.miss_count(), Some(1));
}

#[tokio::test]
async fn test_misuse_emits_developer_fault() {
    let mut rig = TestRig::with_records(10);
    rig.start_default().await;

    rig.recognize("image:A").await;
    rig.recognize("misuse").await;

    let fault = rig.events.expect_type("DeveloperFault").await;
    match fault {
        ScanEvent::DeveloperFault { message, .. } => assert!(message.contains("misuse")),
        other => panic!("unexpected event {:?}", other),
    }

    // Scanning continues; the misuse frame counted as a miss
    let status = rig.status().await;
    assert!(status.scanning);
    assert_eq!(status.lock.miss_count(), Some(1));
}

// ============================================================================
// Start preconditions
// ============================================================================

#[tokio::test]
async fn test_start_requires_configure() {
    let rig = TestRig::with_records(10);
    assert!(matches!(rig.session.start().await, Err(Error::NotConfigured)));
}

#[tokio::test]
async fn test_configure_rejects_empty_scan_options() {
    let rig = TestRig::with_records(10);
    let result = rig
        .session
        .configure(vrs_common::ScanOptions::empty(), SessionConfig::default())
        .await;
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[tokio::test]
async fn test_incompatible_device_is_fatal() {
    let mut rig = TestRig::new(GatedBackend::incompatible(), ControlledStore::new(10));
    rig.configure(SessionConfig::default()).await;

    let result = rig.session.start().await;
    assert!(matches!(result, Err(Error::DeviceIncompatible(_))));

    let fatal = rig.events.expect_type("FatalError").await;
    assert!(matches!(
        fatal,
        ScanEvent::FatalError {
            kind: FatalKind::DeviceIncompatible,
            ..
        }
    ));
    assert!(!rig.store.is_open());
    assert_eq!(rig.frames.requests(), 0);

    // Terminal: every further start fails
    assert!(matches!(
        rig.session.start().await,
        Err(Error::Fatal {
            kind: FatalKind::DeviceIncompatible,
            ..
        })
    ));
}

#[tokio::test]
async fn test_credential_mismatch_is_fatal() {
    let mut rig = TestRig::new(
        GatedBackend::new(),
        ControlledStore::new(10).with_credential_mismatch(),
    );
    rig.configure(SessionConfig::default()).await;

    assert!(rig.session.start().await.is_err());
    let fatal = rig.events.expect_type("FatalError").await;
    assert!(matches!(
        fatal,
        ScanEvent::FatalError {
            kind: FatalKind::CredentialMismatch,
            ..
        }
    ));
    assert_eq!(rig.store.syncs_started(), 0);
}

#[tokio::test]
async fn test_shutdown_closes_store() {
    let rig = TestRig::with_records(0);
    rig.start_default().await;
    assert!(rig.store.is_open());
    assert_eq!(rig.store.syncs_started(), 1);

    rig.session.shutdown().await.expect("shutdown");
    assert!(!rig.store.is_open());
    assert_eq!(rig.store.cancels(), 1);

    // Late callbacks from the abandoned sync are harmless
    rig.store.complete(50);
    assert!(matches!(rig.session.start().await, Err(Error::SessionClosed)));
}
