// ── Tenant hierarchy domain types ──
//
// company → program → site → device. A device's program and company are
// derived from its site and can only be written through the device gate
// in `store::devices`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::cadence::SiteCadenceConfig;
use super::entity_id::{DeviceId, EntityId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: EntityId,
    pub company_id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: EntityId,
    pub program_id: EntityId,
    pub company_id: EntityId,
    pub name: String,
    /// Snapshot cadence, if the site takes part in periodic aggregation.
    pub cadence: Option<SiteCadenceConfig>,
}

impl Site {
    /// The ownership chain this site pins onto its devices.
    pub fn lineage(&self) -> SiteLineage {
        SiteLineage {
            site_id: self.id.clone(),
            program_id: self.program_id.clone(),
            company_id: self.company_id.clone(),
        }
    }
}

/// Resolved ownership chain of a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteLineage {
    pub site_id: EntityId,
    pub program_id: EntityId,
    pub company_id: EntityId,
}

/// What a field device produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceKind {
    ImageCapture,
    EnvironmentalSensor,
}

/// A registered field device.
///
/// `program_id` and `company_id` are private: they always mirror the
/// device's site and are only written by the device write gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: Option<String>,
    pub kind: DeviceKind,
    pub firmware_version: Option<String>,
    pub(crate) site_id: EntityId,
    pub(crate) program_id: EntityId,
    pub(crate) company_id: EntityId,
    /// Last time the device was heard from (heartbeat, metadata or chunk).
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Images the device reported as queued locally at its last heartbeat.
    pub pending_images: u32,
}

impl Device {
    pub fn site_id(&self) -> &EntityId {
        &self.site_id
    }

    pub fn program_id(&self) -> &EntityId {
        &self.program_id
    }

    pub fn company_id(&self) -> &EntityId {
        &self.company_id
    }

    pub fn lineage(&self) -> SiteLineage {
        SiteLineage {
            site_id: self.site_id.clone(),
            program_id: self.program_id.clone(),
            company_id: self.company_id.clone(),
        }
    }
}

/// A create-or-update request for a device record.
///
/// The only input that affects lineage is `site_id`; program and company
/// are resolved from it. `None` on update keeps the current site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceWrite {
    pub id: DeviceId,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: DeviceKind,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub site_id: Option<EntityId>,
}

/// A create-or-update request for a site. The site's company is derived
/// from its program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteWrite {
    pub id: EntityId,
    pub program_id: EntityId,
    pub name: String,
    #[serde(default)]
    pub cadence: Option<SiteCadenceConfig>,
}
