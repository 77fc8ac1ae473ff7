// ── Observation (sensor reading) domain types ──
//
// The device-capture payload is opaque: stored verbatim, indexed for
// correlation, never interpreted by ingestion, reclamation or scheduling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity_id::{DeviceId, EntityId};
use super::hierarchy::SiteLineage;

/// Arbitrary key/value sensor snapshot as sent by the device
/// (temperature, humidity, pressure, firmware version, battery voltage, ...).
pub type DeviceCapture = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: EntityId,
    pub device_id: DeviceId,
    pub lineage: SiteLineage,
    pub recorded_at: DateTime<Utc>,
    pub is_device_generated: bool,
    pub device_capture: Option<DeviceCapture>,
}

impl Observation {
    /// Whether the capture payload holds `key` with exactly `value`.
    pub fn capture_matches(&self, key: &str, value: &Value) -> bool {
        self.device_capture
            .as_ref()
            .and_then(|capture| capture.get(key))
            .is_some_and(|v| v == value)
    }
}

/// Input for recording an observation. Lineage is resolved from the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationWrite {
    pub device_id: DeviceId,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub is_device_generated: bool,
    #[serde(default)]
    pub device_capture: Option<DeviceCapture>,
}
