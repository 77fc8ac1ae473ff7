// Integration tests for the stale reclamation engine.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;

use common::{at, camera, engine};
use fieldgate_core::config::STALE_REASON;
use fieldgate_core::{
    DeviceId, Engine, EngineEvent, ImageTransfer, SweepOrigin, TransferState,
};

/// Transfer for `device` that received `got` of `total` chunks, the last
/// one at `progress`.
fn partial(
    engine: &Engine,
    device: &str,
    image: &str,
    got: u32,
    total: u32,
    progress: DateTime<Utc>,
) -> Arc<ImageTransfer> {
    let ingest = engine.ingestor();
    let transfer = ingest
        .create_transfer(&DeviceId::new(device), image, total, progress)
        .unwrap();
    for i in 0..got {
        ingest.accept_chunk(&transfer.id, i, None, progress).unwrap();
    }
    engine.store().transfer(&transfer.id).unwrap()
}

// ── Automatic sweep ─────────────────────────────────────────────────

#[test]
fn test_sweep_fails_stale_transfers_preserving_counts() {
    let engine = engine();
    let stale = partial(&engine, "cam-1", "a.jpg", 2, 5, at(8, 0));
    let pending = partial(&engine, "cam-2", "b.jpg", 0, 3, at(8, 30));

    let report = engine.reclaimer().sweep_stale(at(9, 45));

    assert_eq!(report.cleared.len(), 2);
    assert!(report.skipped.is_empty());
    let cleared = report
        .cleared
        .iter()
        .find(|c| c.transfer_id == stale.id)
        .unwrap();
    assert_eq!(cleared.device, DeviceId::new("cam-1"));
    assert_eq!(cleared.image, "a.jpg");
    assert_eq!(cleared.received_chunks, 2);
    assert_eq!(cleared.total_chunks, 5);
    assert_eq!(cleared.age_minutes, 105);

    let failed = engine.store().transfer(&stale.id).unwrap();
    assert_eq!(failed.state, TransferState::Failed);
    assert_eq!(failed.received_chunks(), 2);
    assert_eq!(failed.total_chunks, 5);
    assert_eq!(failed.failure_reason.as_deref(), Some(STALE_REASON));
    assert_eq!(failed.terminal_at, Some(at(9, 45)));
    assert_eq!(failed.last_progress_at, at(8, 0));

    let failed = engine.store().transfer(&pending.id).unwrap();
    assert_eq!(failed.state, TransferState::Failed);
    assert_eq!(failed.received_chunks(), 0);
}

#[test]
fn test_fresh_and_terminal_transfers_are_untouched() {
    let engine = engine();
    let fresh = partial(&engine, "cam-1", "fresh.jpg", 1, 4, at(9, 0));
    let done = partial(&engine, "cam-1", "done.jpg", 2, 2, at(6, 0));

    let report = engine.reclaimer().sweep_stale(at(9, 30));

    assert!(report.is_empty());
    assert_eq!(
        engine.store().transfer(&fresh.id).unwrap().state,
        TransferState::Receiving
    );
    assert_eq!(
        engine.store().transfer(&done.id).unwrap().state,
        TransferState::Complete
    );
}

#[test]
fn test_second_sweep_is_empty() {
    let engine = engine();
    partial(&engine, "cam-1", "a.jpg", 1, 3, at(6, 0));
    partial(&engine, "cam-2", "b.jpg", 2, 3, at(6, 0));

    let first = engine.reclaimer().sweep_stale(at(9, 0));
    let second = engine.reclaimer().sweep_stale(at(9, 0));

    assert_eq!(first.cleared.len(), 2);
    assert!(second.is_empty());
}

#[test]
fn test_sweep_releases_image_name() {
    let engine = engine();
    let stale = partial(&engine, "cam-1", "a.jpg", 1, 3, at(6, 0));
    engine.reclaimer().sweep_stale(at(9, 0));

    let err = engine
        .ingestor()
        .accept_chunk(&stale.id, 2, None, at(9, 1))
        .unwrap_err();
    assert!(err.is_benign());

    let retry = engine
        .ingestor()
        .create_transfer(&DeviceId::new("cam-1"), "a.jpg", 3, at(9, 2))
        .unwrap();
    assert_ne!(retry.id, stale.id);
    assert_eq!(retry.state, TransferState::Pending);
}

#[tokio::test]
async fn test_sweep_publishes_report() {
    let engine = engine();
    let mut events = engine.events();
    partial(&engine, "cam-1", "a.jpg", 1, 3, at(6, 0));

    engine.reclaimer().sweep_stale(at(9, 0));

    let mut reclaimed = None;
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::TransfersReclaimed { origin, report } = event.as_ref() {
            reclaimed = Some((*origin, report.cleared.len()));
        }
    }
    assert_eq!(reclaimed, Some((SweepOrigin::Automatic, 1)));
}

// ── Races ───────────────────────────────────────────────────────────

#[test]
fn test_completion_wins_over_planned_sweep() {
    let engine = engine();
    let transfer = partial(&engine, "cam-1", "a.jpg", 4, 5, at(6, 0));
    let reclaimer = engine.reclaimer();

    // The sweep selects the transfer...
    let plan = reclaimer.plan(at(9, 0), Duration::from_secs(3600), None);
    assert_eq!(plan.candidates.len(), 1);

    // ...the final chunk commits first...
    let receipt = engine
        .ingestor()
        .accept_chunk(&transfer.id, 4, None, at(9, 0))
        .unwrap();
    assert_eq!(receipt.transfer.state, TransferState::Complete);

    // ...and the sweep's conditional update observes it.
    let report = reclaimer.apply(&plan, STALE_REASON, SweepOrigin::Automatic);
    assert!(report.cleared.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].transfer_id, transfer.id);

    let stored = engine.store().transfer(&transfer.id).unwrap();
    assert_eq!(stored.state, TransferState::Complete);
    assert!(stored.failure_reason.is_none());
}

#[test]
fn test_progress_after_planning_cancels_reclaim() {
    let engine = engine();
    let transfer = partial(&engine, "cam-1", "a.jpg", 1, 5, at(6, 0));
    let reclaimer = engine.reclaimer();

    let plan = reclaimer.plan(at(9, 0), Duration::from_secs(3600), None);
    engine
        .ingestor()
        .accept_chunk(&transfer.id, 1, None, at(9, 0))
        .unwrap();
    let report = reclaimer.apply(&plan, STALE_REASON, SweepOrigin::Automatic);

    assert!(report.cleared.is_empty());
    assert!(report.skipped[0].reason.contains("changed concurrently"));
    assert_eq!(
        engine.store().transfer(&transfer.id).unwrap().state,
        TransferState::Receiving
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sweeps_clear_each_transfer_once() {
    let engine = engine();
    for i in 0..40 {
        let device = if i % 2 == 0 { "cam-1" } else { "cam-2" };
        partial(&engine, device, &format!("img_{i}.jpg"), 1, 3, at(6, 0));
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            engine.reclaimer().sweep_stale(at(9, 0)).cleared.len()
        }));
    }
    let mut cleared = 0;
    for handle in handles {
        cleared += handle.await.unwrap();
    }

    assert_eq!(cleared, 40);
    assert_eq!(
        engine.store().transfers_in_state(TransferState::Failed).len(),
        40
    );
}

// ── Operator sweep ──────────────────────────────────────────────────

#[test]
fn test_manual_sweep_is_scoped_to_device_and_age() {
    let engine = engine();
    engine.write_device(camera("cam-3", "south")).unwrap();
    let now = at(12, 0);

    let d_old = partial(&engine, "cam-1", "old.jpg", 3, 8, at(9, 0));
    let d_recent = partial(&engine, "cam-1", "recent.jpg", 1, 8, at(10, 30));
    let other_old = partial(&engine, "cam-3", "other.jpg", 2, 8, at(6, 0));

    let result = engine
        .reclaimer()
        .clear_stale_for_device(&DeviceId::new("cam-1"), 2, now);

    assert_eq!(result.count, 1);
    assert_eq!(result.cleared_images.len(), 1);
    assert_eq!(result.cleared_images[0].transfer_id, d_old.id);
    assert_eq!(result.cleared_images[0].received_chunks, 3);
    assert_eq!(result.cleared_images[0].age_minutes, 180);

    let state = |t: &ImageTransfer| engine.store().transfer(&t.id).unwrap().state;
    assert_eq!(state(&d_old), TransferState::Failed);
    assert_eq!(state(&d_recent), TransferState::Receiving);
    assert_eq!(state(&other_old), TransferState::Receiving);
}

#[test]
fn test_manual_sweep_with_nothing_stale_returns_empty_result() {
    let engine = engine();
    partial(&engine, "cam-1", "a.jpg", 1, 2, at(11, 30));

    let result = engine
        .reclaimer()
        .clear_stale_for_device(&DeviceId::new("cam-1"), 1, at(12, 0));
    assert_eq!(result.count, 0);
    assert!(result.cleared_images.is_empty());

    let unknown = engine
        .reclaimer()
        .clear_stale_for_device(&DeviceId::new("nobody"), 1, at(12, 0));
    assert_eq!(unknown.count, 0);
}
