// ── Cadence scheduler ──
//
// Evaluates every site on each tick. Sites are independent: one site's
// bad configuration never stops the others.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use super::Cadence;
use crate::error::CoreError;
use crate::events::EventBus;
use crate::model::{EngineEvent, EntityId, Site, SiteFailure, SnapshotCommand, TickReport};
use crate::store::DataStore;

#[derive(Clone)]
pub struct CadenceScheduler {
    store: Arc<DataStore>,
    events: EventBus,
    default_timezone: Tz,
}

impl CadenceScheduler {
    pub(crate) fn new(store: Arc<DataStore>, events: EventBus, default_timezone: Tz) -> Self {
        Self {
            store,
            events,
            default_timezone,
        }
    }

    /// Whether `site_id` owes a snapshot at `now`. Sites without a cadence
    /// are never due.
    pub fn is_due(&self, site_id: &EntityId, now: DateTime<Utc>) -> Result<bool, CoreError> {
        let site = self.site(site_id)?;
        let Some(cadence) = self.cadence_of(&site)? else {
            return Ok(false);
        };
        Ok(cadence.is_due(self.store.last_snapshot_boundary(site_id), now))
    }

    /// Next instant `site_id` becomes due after `now`, if it has a cadence.
    pub fn next_due(
        &self,
        site_id: &EntityId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, CoreError> {
        let site = self.site(site_id)?;
        let Some(cadence) = self.cadence_of(&site)? else {
            return Ok(None);
        };
        if cadence.is_due(self.store.last_snapshot_boundary(site_id), now) {
            return Ok(Some(now));
        }
        Ok(Some(cadence.next_boundary(now)))
    }

    /// One scheduler tick: issue a snapshot command for every due site.
    ///
    /// Each boundary is claimed atomically before its command is emitted,
    /// so overlapping ticks issue it once.
    pub fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        for site in self.store.sites_snapshot().iter() {
            let cadence = match self.cadence_of(site) {
                Ok(Some(cadence)) => cadence,
                Ok(None) => continue,
                Err(e) => {
                    warn!(site = %site.id, error = %e, "skipping site with unusable cadence");
                    report.failed.push(SiteFailure {
                        site_id: site.id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let boundary = cadence.current_boundary(now);
            if !self.store.claim_boundary(&site.id, boundary) {
                debug!(site = %site.id, %boundary, "boundary already issued");
                continue;
            }
            let command = SnapshotCommand {
                site_id: site.id.clone(),
                boundary,
                issued_at: now,
            };
            info!(site = %site.id, %boundary, "snapshot requested");
            self.events
                .emit(EngineEvent::SnapshotRequested(command.clone()));
            report.issued.push(command);
        }
        report
    }

    fn site(&self, site_id: &EntityId) -> Result<Arc<Site>, CoreError> {
        self.store.site(site_id).ok_or_else(|| CoreError::UnknownSite {
            site_id: site_id.clone(),
        })
    }

    fn cadence_of(&self, site: &Site) -> Result<Option<Cadence>, CoreError> {
        site.cadence
            .as_ref()
            .map(|cfg| Cadence::from_config(cfg, self.default_timezone))
            .transpose()
    }
}
