// ── Transfer state machine ──
//
// Pure transitions over `ImageTransfer`. Each function takes the current
// committed value and returns its replacement, so callers can run it inside
// an entity's read-modify-write and commit or discard the result whole.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::model::{ChunkOutcome, DeviceId, EntityId, ImageTransfer, SiteLineage, TransferState};

/// A fresh `Pending` transfer with no chunks received.
pub(crate) fn new_transfer(
    device_id: DeviceId,
    image_name: String,
    total_chunks: u32,
    lineage: SiteLineage,
    captured_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<ImageTransfer, CoreError> {
    ensure_chunk_count(total_chunks)?;
    Ok(ImageTransfer {
        id: EntityId::generate(),
        device_id,
        image_name,
        lineage,
        total_chunks,
        received_indices: BTreeSet::new(),
        state: TransferState::Pending,
        created_at: now,
        last_progress_at: now,
        captured_at,
        failure_reason: None,
        terminal_at: None,
    })
}

/// Record chunk `index`.
///
/// Terminal transfers are left untouched and yield `AlreadyTerminal`. A new
/// index moves `Pending` to `Receiving`, and the last missing index moves
/// the transfer to `Complete`. A repeated index refreshes progress only.
pub(crate) fn accept_chunk(
    current: &ImageTransfer,
    index: u32,
    now: DateTime<Utc>,
) -> Result<(ImageTransfer, ChunkOutcome), CoreError> {
    ensure_open(current)?;
    if index >= current.total_chunks {
        return Err(CoreError::ChunkOutOfRange {
            transfer_id: current.id.clone(),
            index,
            total: current.total_chunks,
        });
    }

    let mut next = current.clone();
    next.last_progress_at = now;
    if !next.received_indices.insert(index) {
        return Ok((next, ChunkOutcome::Duplicate));
    }

    if next.received_chunks() == next.total_chunks {
        next.state = TransferState::Complete;
        next.terminal_at = Some(now);
        Ok((next, ChunkOutcome::Completed))
    } else {
        next.state = TransferState::Receiving;
        Ok((next, ChunkOutcome::Accepted))
    }
}

/// Move a non-terminal transfer to `Failed`. Received and total counts are
/// kept as they were.
pub(crate) fn fail(
    current: &ImageTransfer,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<ImageTransfer, CoreError> {
    ensure_open(current)?;
    let mut next = current.clone();
    next.state = TransferState::Failed;
    next.failure_reason = Some(reason.to_owned());
    next.terminal_at = Some(now);
    Ok(next)
}

/// Change the announced chunk count. Only allowed before the first chunk.
pub(crate) fn resize(current: &ImageTransfer, total_chunks: u32) -> Result<ImageTransfer, CoreError> {
    ensure_chunk_count(total_chunks)?;
    ensure_open(current)?;
    if current.state != TransferState::Pending {
        return Err(CoreError::ValidationFailed {
            message: format!(
                "transfer {} already receiving; chunk count fixed at {}",
                current.id, current.total_chunks
            ),
        });
    }
    let mut next = current.clone();
    next.total_chunks = total_chunks;
    Ok(next)
}

fn ensure_open(transfer: &ImageTransfer) -> Result<(), CoreError> {
    if transfer.state.is_terminal() {
        return Err(CoreError::AlreadyTerminal {
            transfer_id: transfer.id.clone(),
            state: transfer.state,
        });
    }
    Ok(())
}

fn ensure_chunk_count(total_chunks: u32) -> Result<(), CoreError> {
    if total_chunks == 0 {
        return Err(CoreError::ValidationFailed {
            message: "total_chunks must be at least 1".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn pending(total: u32) -> ImageTransfer {
        let lineage = SiteLineage {
            site_id: "north".into(),
            program_id: "orchard".into(),
            company_id: "acme".into(),
        };
        new_transfer("cam-1".into(), "img_001.jpg".into(), total, lineage, None, t0()).unwrap()
    }

    #[test]
    fn zero_chunks_is_rejected() {
        let lineage = pending(1).lineage;
        let err = new_transfer("cam-1".into(), "x".into(), 0, lineage, None, t0()).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }));
    }

    #[test]
    fn first_chunk_moves_to_receiving() {
        let t = pending(3);
        let later = t0() + Duration::minutes(5);
        let (next, outcome) = accept_chunk(&t, 1, later).unwrap();
        assert_eq!(outcome, ChunkOutcome::Accepted);
        assert_eq!(next.state, TransferState::Receiving);
        assert_eq!(next.received_chunks(), 1);
        assert_eq!(next.last_progress_at, later);
        assert_eq!(next.missing_chunks(), vec![0, 2]);
    }

    #[test]
    fn last_chunk_completes_in_any_order() {
        let mut t = pending(3);
        let mut outcomes = Vec::new();
        for i in [2, 0, 1] {
            let (next, outcome) = accept_chunk(&t, i, t0()).unwrap();
            t = next;
            outcomes.push(outcome);
        }
        assert_eq!(
            outcomes,
            vec![ChunkOutcome::Accepted, ChunkOutcome::Accepted, ChunkOutcome::Completed]
        );
        assert_eq!(t.state, TransferState::Complete);
        assert_eq!(t.terminal_at, Some(t0()));
    }

    #[test]
    fn duplicate_index_refreshes_progress_without_counting() {
        let (t, _) = accept_chunk(&pending(2), 0, t0()).unwrap();
        let later = t0() + Duration::minutes(1);
        let (next, outcome) = accept_chunk(&t, 0, later).unwrap();
        assert_eq!(outcome, ChunkOutcome::Duplicate);
        assert_eq!(next.received_chunks(), 1);
        assert_eq!(next.state, TransferState::Receiving);
        assert_eq!(next.last_progress_at, later);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let err = accept_chunk(&pending(2), 2, t0()).unwrap_err();
        assert!(matches!(err, CoreError::ChunkOutOfRange { index: 2, total: 2, .. }));
    }

    #[test]
    fn terminal_transfer_rejects_chunks() {
        let (done, _) = accept_chunk(&pending(1), 0, t0()).unwrap();
        let err = accept_chunk(&done, 0, t0() + Duration::hours(1)).unwrap_err();
        assert!(err.is_benign());

        let failed = fail(&pending(2), "gone", t0()).unwrap();
        let err = accept_chunk(&failed, 0, t0()).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyTerminal { state: TransferState::Failed, .. }));
    }

    #[test]
    fn fail_preserves_counts() {
        let (t, _) = accept_chunk(&pending(4), 3, t0()).unwrap();
        let failed = fail(&t, "stale", t0() + Duration::hours(2)).unwrap();
        assert_eq!(failed.state, TransferState::Failed);
        assert_eq!(failed.received_chunks(), 1);
        assert_eq!(failed.total_chunks, 4);
        assert_eq!(failed.failure_reason.as_deref(), Some("stale"));
        assert!(fail(&failed, "again", t0()).unwrap_err().is_benign());
    }

    #[test]
    fn resize_only_while_pending() {
        let t = resize(&pending(3), 5).unwrap();
        assert_eq!(t.total_chunks, 5);
        let (receiving, _) = accept_chunk(&t, 0, t0()).unwrap();
        assert!(resize(&receiving, 6).is_err());
    }
}
