// ── Observation records ──
//
// Sensor readings are stored verbatim. The capture payload is indexed by
// flag and by content for correlation, nothing more.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::DataStore;
use crate::error::CoreError;
use crate::model::{EntityId, Observation, ObservationWrite};

impl DataStore {
    /// Store an observation, tagging it with its device's current lineage.
    ///
    /// A capture payload is only accepted on device-generated records.
    pub fn record_observation(&self, write: ObservationWrite) -> Result<Arc<Observation>, CoreError> {
        if write.device_capture.is_some() && !write.is_device_generated {
            return Err(CoreError::ValidationFailed {
                message: "device_capture is only allowed on device-generated observations".into(),
            });
        }
        let device = self
            .device(&write.device_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                device: write.device_id.clone(),
            })?;

        let observation = Observation {
            id: EntityId::generate(),
            device_id: write.device_id,
            lineage: device.lineage(),
            recorded_at: write.recorded_at,
            is_device_generated: write.is_device_generated,
            device_capture: write.device_capture,
        };
        debug!(
            device = %observation.device_id,
            observation = %observation.id,
            generated = observation.is_device_generated,
            "observation recorded"
        );
        Ok(self.observations.put(observation.id.clone(), observation))
    }

    /// Observations whose `is_device_generated` flag equals `generated`.
    pub fn observations_by_flag(&self, generated: bool) -> Vec<Arc<Observation>> {
        self.observations
            .filter(|o| o.is_device_generated == generated)
    }

    /// Observations whose capture payload holds `key` with exactly `value`.
    pub fn observations_matching(&self, key: &str, value: &Value) -> Vec<Arc<Observation>> {
        self.observations.filter(|o| o.capture_matches(key, value))
    }
}
