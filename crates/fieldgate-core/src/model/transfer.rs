// ── Image transfer domain types ──

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::entity_id::{DeviceId, EntityId};
use super::hierarchy::SiteLineage;
use super::observation::DeviceCapture;

/// Lifecycle of one inbound image.
///
/// `Pending → Receiving → Complete`, with `Failed` reachable from either
/// non-terminal state. Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransferState {
    Pending,
    Receiving,
    Complete,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// One device-originated image upload tracked from announcement to
/// terminal outcome. Once terminal it is retained unchanged for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTransfer {
    pub id: EntityId,
    pub device_id: DeviceId,
    pub image_name: String,
    /// Tenant scope copied from the device when the transfer was created.
    pub lineage: SiteLineage,
    pub total_chunks: u32,
    pub(crate) received_indices: BTreeSet<u32>,
    pub state: TransferState,
    pub created_at: DateTime<Utc>,
    pub last_progress_at: DateTime<Utc>,
    pub captured_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub terminal_at: Option<DateTime<Utc>>,
}

impl ImageTransfer {
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    pub fn received_chunks(&self) -> u32 {
        // bounded by total_chunks, which is a u32
        self.received_indices.len() as u32
    }

    pub fn has_chunk(&self, index: u32) -> bool {
        self.received_indices.contains(&index)
    }

    /// Indices in `0..total_chunks` that have not arrived yet, ascending.
    pub fn missing_chunks(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.received_indices.contains(i))
            .collect()
    }

    /// Whole minutes since the last accepted chunk (or creation).
    pub fn idle_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_progress_at).num_minutes()
    }
}

/// Announcement a device sends before the chunks of an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub device_id: DeviceId,
    pub image_name: String,
    pub total_chunks: u32,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    /// Sensor snapshot taken alongside the image, stored as an observation.
    #[serde(default)]
    pub capture: Option<DeviceCapture>,
}

/// What happened to a single accepted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkOutcome {
    /// New index recorded; transfer still receiving.
    Accepted,
    /// Index was already present; progress refreshed, count unchanged.
    Duplicate,
    /// This chunk completed the transfer.
    Completed,
}

/// Result of `accept_chunk`: the outcome and the transfer as committed.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReceipt {
    pub outcome: ChunkOutcome,
    pub transfer: Arc<ImageTransfer>,
}

/// Reply to a device after it finishes sending an image.
///
/// Serializes to the device protocol's two shapes:
/// `{"missing_chunks": [..]}` asks for a resend, and
/// `{"ACK_OK": {"next_wake_time": ..}}` releases the device until its
/// site's next snapshot is due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferAck {
    #[serde(rename = "missing_chunks")]
    MissingChunks(Vec<u32>),
    #[serde(rename = "ACK_OK")]
    Ok {
        #[serde(rename = "next_wake_time")]
        next_wake: Option<DateTime<Utc>>,
    },
}

// ── Reclamation reports ─────────────────────────────────────────────

/// One transfer moved to `Failed` by a sweep, with its forensic counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearedTransfer {
    pub transfer_id: EntityId,
    pub device: DeviceId,
    pub image: String,
    pub received_chunks: u32,
    pub total_chunks: u32,
    pub age_minutes: i64,
}

impl ClearedTransfer {
    pub(crate) fn from_transfer(transfer: &ImageTransfer, now: DateTime<Utc>) -> Self {
        Self {
            transfer_id: transfer.id.clone(),
            device: transfer.device_id.clone(),
            image: transfer.image_name.clone(),
            received_chunks: transfer.received_chunks(),
            total_chunks: transfer.total_chunks,
            age_minutes: transfer.idle_minutes(now),
        }
    }
}

/// A candidate a sweep selected but did not transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTransfer {
    pub transfer_id: EntityId,
    pub reason: String,
}

/// Outcome of the unattended stale sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub cleared: Vec<ClearedTransfer>,
    /// Per-entity failures; reported, never raised.
    pub skipped: Vec<SkippedTransfer>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.cleared.is_empty() && self.skipped.is_empty()
    }
}

/// Outcome of an operator-invoked sweep for one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualSweepResult {
    pub count: usize,
    pub cleared_images: Vec<ClearedTransfer>,
}

impl From<SweepReport> for ManualSweepResult {
    fn from(report: SweepReport) -> Self {
        Self {
            count: report.cleared.len(),
            cleared_images: report.cleared,
        }
    }
}
