// ── Unified domain model ──
//
// Every type in this module is the canonical representation of an entity
// the engine tracks: the tenant hierarchy, in-flight image transfers, site
// cadence configuration, and device observations.

pub mod cadence;
pub mod entity_id;
pub mod event;
pub mod hierarchy;
pub mod observation;
pub mod transfer;

// ── Re-exports ──────────────────────────────────────────────────────
// Flat access: `use fieldgate_core::model::*` gives you everything.

// Core identity
pub use entity_id::{DeviceId, EntityId};

// Hierarchy
pub use hierarchy::{
    Company, Device, DeviceKind, DeviceWrite, Program, Site, SiteLineage, SiteWrite,
};

// Transfers
pub use transfer::{
    ChunkOutcome, ChunkReceipt, ClearedTransfer, ImageMetadata, ImageTransfer, ManualSweepResult,
    SkippedTransfer, SweepReport, TransferAck, TransferState,
};

// Cadence
pub use cadence::{
    ALLOWED_SNAPSHOTS_PER_DAY, MAX_HOURS_BETWEEN, MIN_HOURS_BETWEEN, SiteCadenceConfig,
    SiteFailure, SnapshotCommand, TickReport,
};

// Observations
pub use observation::{DeviceCapture, Observation, ObservationWrite};

// Events
pub use event::{EngineEvent, SweepOrigin};
