// ── Engine events ──
//
// Broadcast to observability and aggregation collaborators. Receivers that
// lag simply miss events; nothing in the engine waits on them.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::cadence::SnapshotCommand;
use super::entity_id::{DeviceId, EntityId};
use super::transfer::SweepReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepOrigin {
    /// The unattended periodic sweep.
    Automatic,
    /// An operator-invoked sweep for one device.
    Operator,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
#[non_exhaustive]
pub enum EngineEvent {
    TransferStarted {
        transfer_id: EntityId,
        device: DeviceId,
        image: String,
        total_chunks: u32,
    },
    TransferCompleted {
        transfer_id: EntityId,
        device: DeviceId,
        image: String,
    },
    /// Chunk payloads of a completed transfer, concatenated in index order.
    ImageAssembled {
        transfer_id: EntityId,
        device: DeviceId,
        image: String,
        #[serde(skip)]
        bytes: Bytes,
        size: usize,
    },
    TransfersReclaimed {
        origin: SweepOrigin,
        report: SweepReport,
    },
    SnapshotRequested(SnapshotCommand),
    DeviceHeartbeat {
        device: DeviceId,
        pending_images: u32,
        at: DateTime<Utc>,
    },
}
