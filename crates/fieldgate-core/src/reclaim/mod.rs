// ── Stale transfer reclamation ──
//
// Two entry points, one transition rule. A sweep first selects candidates
// from a snapshot, then fails each one with a conditional update that
// re-checks "still open, still stale" under the entity lock. Whatever
// committed first wins; the loser is reported as skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::STALE_REASON;
use crate::error::CoreError;
use crate::events::EventBus;
use crate::ingest::machine;
use crate::model::{
    ClearedTransfer, DeviceId, EngineEvent, ImageTransfer, ManualSweepResult, SkippedTransfer,
    SweepOrigin, SweepReport,
};
use crate::store::DataStore;

/// Default inactivity age for an operator sweep.
pub const DEFAULT_MANUAL_AGE_HOURS: u32 = 1;

/// Candidates selected by one sweep, not yet transitioned.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    /// Instant the sweep treats as "now".
    pub now: DateTime<Utc>,
    /// Transfers with no progress since this instant are stale.
    pub cutoff: DateTime<Utc>,
    pub candidates: Vec<Arc<ImageTransfer>>,
}

impl SweepPlan {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Stale reclamation service.
pub struct Reclaimer {
    store: Arc<DataStore>,
    events: EventBus,
    stale_threshold: Duration,
}

impl Reclaimer {
    pub(crate) fn new(store: Arc<DataStore>, events: EventBus, stale_threshold: Duration) -> Self {
        Self {
            store,
            events,
            stale_threshold,
        }
    }

    /// The automatic sweep: fail every open transfer idle for longer than
    /// the configured threshold.
    pub fn sweep_stale(&self, now: DateTime<Utc>) -> SweepReport {
        let plan = self.plan(now, self.stale_threshold, None);
        let report = self.apply(&plan, STALE_REASON, SweepOrigin::Automatic);
        if report.cleared.is_empty() {
            debug!(skipped = report.skipped.len(), "stale sweep found nothing to clear");
        } else {
            info!(
                cleared = report.cleared.len(),
                skipped = report.skipped.len(),
                "stale sweep cleared transfers"
            );
        }
        report
    }

    /// The operator sweep: fail `device`'s open transfers idle for longer
    /// than `age_hours`. Always returns a result, possibly with zero count.
    pub fn clear_stale_for_device(
        &self,
        device: &DeviceId,
        age_hours: u32,
        now: DateTime<Utc>,
    ) -> ManualSweepResult {
        let age = Duration::from_secs(u64::from(age_hours) * 3600);
        let plan = self.plan(now, age, Some(device));
        let reason = format!("cleared by operator: no progress for over {age_hours}h");
        let report = self.apply(&plan, &reason, SweepOrigin::Operator);
        info!(
            %device,
            age_hours,
            cleared = report.cleared.len(),
            "operator sweep finished"
        );
        ManualSweepResult::from(report)
    }

    /// Select open transfers whose last progress is older than `max_age`,
    /// optionally restricted to one device. Nothing is written.
    pub fn plan(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
        device: Option<&DeviceId>,
    ) -> SweepPlan {
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let candidates = self.store.transfers.filter(|t| {
            !t.state.is_terminal()
                && t.last_progress_at < cutoff
                && device.is_none_or(|d| &t.device_id == d)
        });
        SweepPlan {
            now,
            cutoff,
            candidates,
        }
    }

    /// Fail every planned candidate that is still open and still stale.
    ///
    /// Each candidate is an independent conditional update; stopping part
    /// way leaves every transfer in a valid state for the next sweep.
    pub fn apply(&self, plan: &SweepPlan, reason: &str, origin: SweepOrigin) -> SweepReport {
        let mut report = SweepReport::default();
        for candidate in &plan.candidates {
            match self.fail_if_stale(candidate, plan, reason) {
                Ok(failed) => {
                    debug!(
                        transfer = %failed.id,
                        device = %failed.device_id,
                        image = %failed.image_name,
                        received = failed.received_chunks(),
                        total = failed.total_chunks,
                        "transfer reclaimed"
                    );
                    self.release(&failed);
                    report
                        .cleared
                        .push(ClearedTransfer::from_transfer(&failed, plan.now));
                }
                Err(e) => {
                    if matches!(
                        e,
                        CoreError::AlreadyTerminal { .. } | CoreError::ConcurrentTransitionLost { .. }
                    ) {
                        debug!(transfer = %candidate.id, error = %e, "sweep lost race");
                    } else {
                        warn!(transfer = %candidate.id, error = %e, "could not reclaim transfer");
                    }
                    report.skipped.push(SkippedTransfer {
                        transfer_id: candidate.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !report.cleared.is_empty() {
            self.events.emit(EngineEvent::TransfersReclaimed {
                origin,
                report: report.clone(),
            });
        }
        report
    }

    fn fail_if_stale(
        &self,
        candidate: &ImageTransfer,
        plan: &SweepPlan,
        reason: &str,
    ) -> Result<Arc<ImageTransfer>, CoreError> {
        let updated = self.store.transfers.update(&candidate.id, |current| {
            if !current.state.is_terminal() && current.last_progress_at >= plan.cutoff {
                return Err(CoreError::ConcurrentTransitionLost {
                    transfer_id: current.id.clone(),
                    detail: "progressed since it was selected".into(),
                });
            }
            machine::fail(current, reason, plan.now).map(|next| (next, ()))
        });
        match updated {
            Some(result) => result.map(|(failed, ())| failed),
            None => Err(CoreError::TransferNotFound {
                transfer_id: candidate.id.clone(),
            }),
        }
    }

    /// Drop a failed transfer's buffered payloads and its active slot.
    fn release(&self, transfer: &ImageTransfer) {
        self.store.chunk_buffers.remove(&transfer.id);
        let key = (transfer.device_id.clone(), transfer.image_name.clone());
        self.store
            .active_transfers
            .remove_if(&key, |_, id| id == &transfer.id);
    }
}
