// ── Site cadence writes and boundary claims ──

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use tracing::info;

use super::DataStore;
use crate::cadence;
use crate::error::CoreError;
use crate::model::{EntityId, Site, SiteCadenceConfig};

impl DataStore {
    /// Replace a site's cadence. An invalid configuration is rejected and
    /// the previous one stays in force. `None` removes the cadence.
    pub fn set_site_cadence(
        &self,
        site_id: &EntityId,
        config: Option<SiteCadenceConfig>,
    ) -> Result<Arc<Site>, CoreError> {
        if let Some(cfg) = &config {
            cadence::validate(cfg)?;
        }
        let updated = self.sites.update(site_id, |current| {
            let mut next = current.clone();
            next.cadence.clone_from(&config);
            Ok::<_, CoreError>((next, ()))
        });
        match updated {
            Some(result) => {
                let (site, ()) = result?;
                info!(site = %site.id, cadence = ?site.cadence, "site cadence changed");
                Ok(site)
            }
            None => Err(CoreError::UnknownSite {
                site_id: site_id.clone(),
            }),
        }
    }

    /// Record `boundary` as the last snapshot boundary for `site_id`, but
    /// only if it is later than the one already recorded. Returns whether
    /// this call claimed it; overlapping ticks see `false`.
    pub(crate) fn claim_boundary(&self, site_id: &EntityId, boundary: DateTime<Utc>) -> bool {
        match self.snapshot_boundaries.entry(site_id.clone()) {
            Entry::Occupied(mut last) => {
                if *last.get() >= boundary {
                    return false;
                }
                last.insert(boundary);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(boundary);
                true
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::model::{Company, Program, SiteWrite};

    fn store() -> DataStore {
        let store = DataStore::new();
        store.add_company(Company {
            id: "acme".into(),
            name: "Acme".into(),
        });
        store
            .add_program(Program {
                id: "orchard".into(),
                company_id: "acme".into(),
                name: "Orchard".into(),
            })
            .unwrap();
        store
            .add_site(SiteWrite {
                id: "north".into(),
                program_id: "orchard".into(),
                name: "North".into(),
                cadence: Some(SiteCadenceConfig::per_day(24)),
            })
            .unwrap();
        store
    }

    #[test]
    fn invalid_cadence_keeps_previous_config() {
        let store = store();
        let site = EntityId::from("north");
        for bad in [
            SiteCadenceConfig::per_day(7),
            SiteCadenceConfig::every_hours(0.1),
            SiteCadenceConfig::every_hours(25.0),
            SiteCadenceConfig::per_day(24).with_timezone("Mars/Olympus"),
        ] {
            let err = store.set_site_cadence(&site, Some(bad)).unwrap_err();
            assert!(matches!(err, CoreError::InvalidCadenceConfig { .. }));
        }
        assert_eq!(
            store.site(&site).unwrap().cadence,
            Some(SiteCadenceConfig::per_day(24))
        );
    }

    #[test]
    fn cadence_on_unknown_site_fails() {
        let store = store();
        let err = store
            .set_site_cadence(&"nowhere".into(), Some(SiteCadenceConfig::per_day(4)))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownSite { .. }));
    }

    #[test]
    fn boundary_is_claimed_once() {
        let store = store();
        let site = EntityId::from("north");
        let b1 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let b0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

        assert!(store.claim_boundary(&site, b1));
        assert!(!store.claim_boundary(&site, b1));
        assert!(!store.claim_boundary(&site, b0));
        assert_eq!(store.last_snapshot_boundary(&site), Some(b1));
    }
}
