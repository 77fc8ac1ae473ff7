// ── Device write gate ──
//
// Every create or update of a device goes through `write_device`. Lineage
// is resolved under the device's entry lock, and a rejected write leaves
// the stored record exactly as it was.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::DataStore;
use crate::error::CoreError;
use crate::hierarchy::{HierarchyResolver, pin_lineage};
use crate::model::{Device, DeviceId, DeviceWrite};

impl DataStore {
    /// Create or update a device.
    ///
    /// A new device must name a site. On update, `site_id: None` keeps the
    /// current site; any named site is re-resolved even if unchanged.
    ///
    /// The site is read while the device entry is locked. A site move that
    /// lands after that read re-pins the committed device afterwards (see
    /// `add_site`), so the stored lineage always converges on the site's.
    pub fn write_device(&self, write: DeviceWrite) -> Result<Arc<Device>, CoreError> {
        let resolver = HierarchyResolver::new(self);
        let (device, created) = self.devices.upsert(write.id.clone(), |current| {
            let lineage = write
                .site_id
                .as_ref()
                .map(|site| resolver.resolve(&write.id, site))
                .transpose()?;

            if let Some(current) = current {
                let mut next = current.clone();
                if write.name.is_some() {
                    next.name.clone_from(&write.name);
                }
                if write.firmware_version.is_some() {
                    next.firmware_version.clone_from(&write.firmware_version);
                }
                next.kind = write.kind;
                if let Some(lineage) = lineage {
                    pin_lineage(&mut next, lineage);
                }
                return Ok((next, false));
            }

            let Some(lineage) = lineage else {
                return Err(CoreError::ValidationFailed {
                    message: format!("new device {} must be assigned to a site", write.id),
                });
            };
            let device = Device {
                id: write.id.clone(),
                name: write.name.clone(),
                kind: write.kind,
                firmware_version: write.firmware_version.clone(),
                site_id: lineage.site_id,
                program_id: lineage.program_id,
                company_id: lineage.company_id,
                last_seen_at: None,
                pending_images: 0,
            };
            Ok((device, true))
        })?;

        if created {
            debug!(device = %device.id, site = %device.site_id, "device registered");
        } else {
            debug!(device = %device.id, site = %device.site_id, "device updated");
        }
        Ok(device)
    }

    /// Record a heartbeat: refresh `last_seen_at` and `pending_images`.
    pub fn record_heartbeat(
        &self,
        device: &DeviceId,
        pending_images: u32,
        now: DateTime<Utc>,
    ) -> Result<Arc<Device>, CoreError> {
        let updated = self.devices.update(device, |current| {
            let mut next = current.clone();
            next.last_seen_at = Some(now);
            next.pending_images = pending_images;
            Ok::<_, CoreError>((next, ()))
        });
        match updated {
            Some(result) => result.map(|(d, ())| d),
            None => Err(CoreError::DeviceNotFound {
                device: device.clone(),
            }),
        }
    }

    /// Refresh `last_seen_at` only. Unknown devices are ignored.
    pub(crate) fn touch_device(&self, device: &DeviceId, now: DateTime<Utc>) {
        let _ = self.devices.update(device, |current| {
            if current.last_seen_at.is_some_and(|seen| seen >= now) {
                return Err(());
            }
            let mut next = current.clone();
            next.last_seen_at = Some(now);
            Ok((next, ()))
        });
    }
}
