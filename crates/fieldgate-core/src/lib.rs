// fieldgate-core: Ingestion lifecycle, stale reclamation and cadence scheduling
// for intermittently-connected field devices.

pub mod cadence;
pub mod config;
pub mod engine;
pub mod error;
mod events;
pub mod hierarchy;
pub mod ingest;
pub mod model;
pub mod reclaim;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cadence::{Cadence, CadenceScheduler};
pub use config::EngineConfig;
pub use engine::{Engine, EngineState};
pub use error::CoreError;
pub use hierarchy::{HierarchyResolver, SiteDirectory};
pub use ingest::Ingestor;
pub use reclaim::{Reclaimer, SweepPlan};
pub use store::DataStore;
pub use stream::{EntityStream, ObservationFilter, TransferFilter};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Identity and hierarchy
    Company, Device, DeviceId, DeviceKind, DeviceWrite, EntityId, Program, Site, SiteLineage,
    SiteWrite,
    // Transfers
    ChunkOutcome, ChunkReceipt, ClearedTransfer, ImageMetadata, ImageTransfer, ManualSweepResult,
    SkippedTransfer, SweepReport, TransferAck, TransferState,
    // Cadence
    SiteCadenceConfig, SnapshotCommand, TickReport,
    // Observations and events
    DeviceCapture, EngineEvent, Observation, ObservationWrite, SweepOrigin,
};
