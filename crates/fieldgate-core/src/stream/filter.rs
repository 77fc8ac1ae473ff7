// ── Filter predicates for entity snapshots ──

use serde_json::Value;

use crate::model::{DeviceId, EntityId, ImageTransfer, Observation, TransferState};

/// Filter predicate for transfer snapshots.
pub enum TransferFilter {
    All,
    ByState(TransferState),
    ByDevice(DeviceId),
    BySite(EntityId),
    /// Pending or receiving.
    InFlight,
    Terminal,
    Custom(Box<dyn Fn(&ImageTransfer) -> bool + Send + Sync>),
}

impl TransferFilter {
    pub fn matches(&self, transfer: &ImageTransfer) -> bool {
        match self {
            Self::All => true,
            Self::ByState(state) => transfer.state == *state,
            Self::ByDevice(device) => transfer.device_id == *device,
            Self::BySite(site) => transfer.lineage.site_id == *site,
            Self::InFlight => !transfer.state.is_terminal(),
            Self::Terminal => transfer.state.is_terminal(),
            Self::Custom(f) => f(transfer),
        }
    }
}

/// Filter predicate for observation snapshots.
pub enum ObservationFilter {
    All,
    DeviceGenerated(bool),
    ByDevice(DeviceId),
    /// Capture payload holds `key` with exactly this value.
    CaptureField(String, Value),
    Custom(Box<dyn Fn(&Observation) -> bool + Send + Sync>),
}

impl ObservationFilter {
    pub fn matches(&self, observation: &Observation) -> bool {
        match self {
            Self::All => true,
            Self::DeviceGenerated(flag) => observation.is_device_generated == *flag,
            Self::ByDevice(device) => observation.device_id == *device,
            Self::CaptureField(key, value) => observation.capture_matches(key, value),
            Self::Custom(f) => f(observation),
        }
    }
}
