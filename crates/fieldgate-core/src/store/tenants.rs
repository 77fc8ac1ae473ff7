// ── Tenant hierarchy writes ──
//
// Companies, programs and sites. A site's company is always derived from
// its program; moving a site to another program re-pins every device that
// sits on it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::DataStore;
use crate::cadence;
use crate::error::CoreError;
use crate::hierarchy::{HierarchyResolver, pin_lineage};
use crate::model::{Company, EntityId, Program, Site, SiteWrite};

impl DataStore {
    /// Create or rename a company.
    pub fn add_company(&self, company: Company) -> Arc<Company> {
        debug!(company = %company.id, "company written");
        self.companies.put(company.id.clone(), company)
    }

    /// Create or update a program. The owning company must exist.
    pub fn add_program(&self, program: Program) -> Result<Arc<Program>, CoreError> {
        if !self.companies.contains(&program.company_id) {
            return Err(CoreError::UnknownCompany {
                company_id: program.company_id,
            });
        }
        debug!(program = %program.id, "program written");
        Ok(self.programs.put(program.id.clone(), program))
    }

    /// Create or update a site.
    ///
    /// The program must exist; the site's company is taken from it. A
    /// cadence, when present, is validated before anything is written. If
    /// the site's lineage changed, devices at the site are re-pinned.
    pub fn add_site(&self, write: SiteWrite) -> Result<Arc<Site>, CoreError> {
        let program = self
            .programs
            .get(&write.program_id)
            .ok_or_else(|| CoreError::UnknownProgram {
                program_id: write.program_id.clone(),
            })?;
        if let Some(cfg) = &write.cadence {
            cadence::validate(cfg)?;
        }

        let site = Site {
            id: write.id.clone(),
            program_id: program.id.clone(),
            company_id: program.company_id.clone(),
            name: write.name,
            cadence: write.cadence,
        };
        let (stored, previous) = self.sites.replace(site.id.clone(), site);

        let lineage_changed = previous.is_some_and(|p| p.lineage() != stored.lineage());
        if lineage_changed {
            let moved = self.repin_devices_at(&stored.id);
            info!(site = %stored.id, program = %stored.program_id, moved, "site lineage changed");
        }
        Ok(stored)
    }

    /// Re-resolve every device pinned to `site_id`. Returns how many changed.
    ///
    /// The site is read again under each device's entry lock, so a later
    /// move of the same site can only make this pass pin the newer lineage.
    /// A device still committing when the scan reaches it is seen once its
    /// lock is released.
    fn repin_devices_at(&self, site_id: &EntityId) -> usize {
        let resolver = HierarchyResolver::new(self);
        let mut moved = 0;
        for device in self.devices_at_site(site_id) {
            let updated = self.devices.update(&device.id, |current| {
                if current.site_id() != site_id {
                    // Moved elsewhere since the scan; the gate already pinned it.
                    return Err(None::<CoreError>);
                }
                let lineage = resolver.resolve(&current.id, site_id).map_err(Some)?;
                if current.lineage() == lineage {
                    return Err(None);
                }
                let mut next = current.clone();
                pin_lineage(&mut next, lineage);
                Ok((next, ()))
            });
            match updated {
                Some(Ok(_)) => moved += 1,
                Some(Err(Some(e))) => {
                    warn!(device = %device.id, error = %e, "could not re-pin device");
                }
                Some(Err(None)) | None => {}
            }
        }
        moved
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{DeviceKind, DeviceWrite, EntityId, SiteCadenceConfig};

    fn seeded() -> DataStore {
        let store = DataStore::new();
        for c in ["acme", "globex"] {
            store.add_company(Company {
                id: c.into(),
                name: c.to_uppercase(),
            });
        }
        store
            .add_program(Program {
                id: "orchard".into(),
                company_id: "acme".into(),
                name: "Orchard".into(),
            })
            .unwrap();
        store
            .add_program(Program {
                id: "vineyard".into(),
                company_id: "globex".into(),
                name: "Vineyard".into(),
            })
            .unwrap();
        store
    }

    #[test]
    fn program_requires_company() {
        let store = DataStore::new();
        let err = store
            .add_program(Program {
                id: "p".into(),
                company_id: "nobody".into(),
                name: "P".into(),
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownCompany { .. }));
    }

    #[test]
    fn site_company_is_derived_from_program() {
        let store = seeded();
        let site = store
            .add_site(SiteWrite {
                id: "north".into(),
                program_id: "orchard".into(),
                name: "North".into(),
                cadence: None,
            })
            .unwrap();
        assert_eq!(site.company_id, EntityId::from("acme"));
    }

    #[test]
    fn invalid_cadence_rejects_site_write() {
        let store = seeded();
        let err = store
            .add_site(SiteWrite {
                id: "north".into(),
                program_id: "orchard".into(),
                name: "North".into(),
                cadence: Some(SiteCadenceConfig::per_day(5)),
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCadenceConfig { .. }));
        assert_eq!(store.site_count(), 0);
    }

    #[test]
    fn moving_site_to_other_program_repins_devices() {
        let store = seeded();
        let site = SiteWrite {
            id: "north".into(),
            program_id: "orchard".into(),
            name: "North".into(),
            cadence: None,
        };
        store.add_site(site.clone()).unwrap();
        store
            .write_device(DeviceWrite {
                id: "cam-1".into(),
                name: None,
                kind: DeviceKind::ImageCapture,
                firmware_version: None,
                site_id: Some("north".into()),
            })
            .unwrap();

        store
            .add_site(SiteWrite {
                program_id: "vineyard".into(),
                ..site
            })
            .unwrap();

        let device = store.device(&"cam-1".into()).unwrap();
        assert_eq!(device.program_id(), &EntityId::from("vineyard"));
        assert_eq!(device.company_id(), &EntityId::from("globex"));
    }
}
