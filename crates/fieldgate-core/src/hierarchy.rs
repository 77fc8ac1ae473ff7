// ── Hierarchy resolution ──
//
// Pins a device's program and company to those of its site. The resolver
// only needs to look sites up, so tenant bookkeeping stays behind the
// `SiteDirectory` capability.

use tracing::debug;

use crate::error::CoreError;
use crate::model::{Device, DeviceId, EntityId, SiteLineage};
use crate::store::DataStore;

/// Read access to the site registry.
pub trait SiteDirectory: Send + Sync {
    /// Lineage of `site_id`, or `None` if no such site exists.
    fn site_lineage(&self, site_id: &EntityId) -> Option<SiteLineage>;
}

impl SiteDirectory for DataStore {
    fn site_lineage(&self, site_id: &EntityId) -> Option<SiteLineage> {
        self.site(site_id).map(|site| site.lineage())
    }
}

/// Resolves the lineage a device must carry for a proposed site.
pub struct HierarchyResolver<'a, D: SiteDirectory + ?Sized> {
    directory: &'a D,
}

impl<'a, D: SiteDirectory + ?Sized> HierarchyResolver<'a, D> {
    pub fn new(directory: &'a D) -> Self {
        Self { directory }
    }

    /// Resolve the program and company for `device` placed at `site_id`.
    ///
    /// Fails with [`CoreError::UnknownSite`] when the site does not exist;
    /// the caller must then reject the whole device write.
    pub fn resolve(&self, device: &DeviceId, site_id: &EntityId) -> Result<SiteLineage, CoreError> {
        let lineage = self
            .directory
            .site_lineage(site_id)
            .ok_or_else(|| CoreError::UnknownSite {
                site_id: site_id.clone(),
            })?;
        debug!(
            %device,
            site = %lineage.site_id,
            program = %lineage.program_id,
            company = %lineage.company_id,
            "resolved device lineage"
        );
        Ok(lineage)
    }
}

/// Overwrite a device's site, program and company in one step.
///
/// The only writer of those fields; callers hold the device's entry lock.
pub(crate) fn pin_lineage(device: &mut Device, lineage: SiteLineage) {
    device.site_id = lineage.site_id;
    device.program_id = lineage.program_id;
    device.company_id = lineage.company_id;
}
