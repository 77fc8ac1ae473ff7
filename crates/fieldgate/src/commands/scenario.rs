//! Recorded device traffic, replayed against an engine with each step's
//! own timestamp as "now".
//!
//! ```json
//! {
//!   "companies": [{ "id": "acme", "name": "Acme" }],
//!   "programs":  [{ "id": "orchard", "company_id": "acme", "name": "Orchard" }],
//!   "sites":     [{ "id": "north", "program_id": "orchard", "name": "North" }],
//!   "steps": [
//!     { "at": "2024-05-01T00:00:00Z", "op": "register_device",
//!       "id": "b8:f8:62:f9:cf:b8", "kind": "image_capture", "site_id": "north" },
//!     { "at": "2024-05-01T00:01:00Z", "op": "metadata",
//!       "device_id": "b8:f8:62:f9:cf:b8", "image_name": "img-001.jpg", "total_chunks": 2 },
//!     { "at": "2024-05-01T00:02:00Z", "op": "chunk",
//!       "device_id": "b8:f8:62:f9:cf:b8", "image_name": "img-001.jpg", "index": 0 },
//!     { "at": "2024-05-01T03:00:00Z", "op": "sweep" }
//!   ]
//! }
//! ```

use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use fieldgate_config::Seed;
use fieldgate_core::reclaim::DEFAULT_MANUAL_AGE_HOURS;
use fieldgate_core::{
    ChunkOutcome, CoreError, DeviceId, DeviceWrite, Engine, EntityId, ImageMetadata,
    SiteCadenceConfig, TransferAck,
};

use crate::error::CliError;

#[derive(Debug, Default, Deserialize)]
pub struct Scenario {
    /// Hierarchy written before the first step.
    #[serde(flatten)]
    pub hierarchy: Seed,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct Step {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    RegisterDevice(DeviceWrite),
    Metadata(ImageMetadata),
    Chunk {
        device_id: DeviceId,
        image_name: String,
        index: u32,
        /// Chunk payload as text; omitted chunks carry no payload.
        #[serde(default)]
        data: Option<String>,
    },
    Heartbeat {
        device_id: DeviceId,
        pending_images: u32,
    },
    /// The device waits for the server's reply after a transmission.
    Ack {
        device_id: DeviceId,
        image_name: String,
    },
    Sweep,
    ClearStale {
        device_id: DeviceId,
        #[serde(default)]
        age_hours: Option<u32>,
    },
    SetCadence {
        site_id: EntityId,
        #[serde(default)]
        cadence: Option<SiteCadenceConfig>,
    },
    Tick,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterDevice(_) => "register_device",
            Self::Metadata(_) => "metadata",
            Self::Chunk { .. } => "chunk",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Ack { .. } => "ack",
            Self::Sweep => "sweep",
            Self::ClearStale { .. } => "clear_stale",
            Self::SetCadence { .. } => "set_cadence",
            Self::Tick => "tick",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    /// A no-op against a transfer that had already finished.
    Ignored,
    Failed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Ignored => "ignored",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step: usize,
    pub at: DateTime<Utc>,
    pub op: &'static str,
    pub status: StepStatus,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| CliError::Scenario {
            path: path.display().to_string(),
            source,
        })
    }

    /// Write the hierarchy, then run every step in order. A failing step is
    /// reported and the replay continues.
    pub fn replay(&self, engine: &Engine) -> Result<Vec<StepResult>, CliError> {
        self.hierarchy.apply(engine)?;

        let results = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let (status, detail, data) = match run_step(engine, step) {
                    Ok((detail, data)) => (StepStatus::Ok, detail, Some(data)),
                    Err(e) if e.is_benign() => (StepStatus::Ignored, e.to_string(), None),
                    Err(e) => (StepStatus::Failed, e.to_string(), None),
                };
                debug!(step = i + 1, op = step.action.name(), status = status.as_str(), "replayed");
                StepResult {
                    step: i + 1,
                    at: step.at,
                    op: step.action.name(),
                    status,
                    detail,
                    data,
                }
            })
            .collect();
        Ok(results)
    }
}

fn run_step(engine: &Engine, step: &Step) -> Result<(String, Value), CoreError> {
    let now = step.at;
    match &step.action {
        Action::RegisterDevice(write) => {
            let device = engine.write_device(write.clone())?;
            Ok((
                format!("{} registered at site {}", device.id, device.site_id()),
                to_value(&device)?,
            ))
        }
        Action::Metadata(meta) => {
            let transfer = engine.ingestor().ingest_metadata(meta.clone(), now)?;
            Ok((
                format!(
                    "transfer {} for {} is {} ({} chunks)",
                    transfer.id, transfer.image_name, transfer.state, transfer.total_chunks
                ),
                to_value(&transfer)?,
            ))
        }
        Action::Chunk {
            device_id,
            image_name,
            index,
            data,
        } => {
            let payload = data.as_ref().map(|text| Bytes::from(text.clone()));
            let receipt =
                engine
                    .ingestor()
                    .accept_chunk_for(device_id, image_name, *index, payload, now)?;
            let transfer = &receipt.transfer;
            Ok((
                format!(
                    "chunk {index} {}: {}/{} received",
                    outcome_word(receipt.outcome),
                    transfer.received_chunks(),
                    transfer.total_chunks
                ),
                to_value(&receipt)?,
            ))
        }
        Action::Heartbeat {
            device_id,
            pending_images,
        } => {
            let device = engine
                .ingestor()
                .record_heartbeat(device_id, *pending_images, now)?;
            Ok((
                format!("{} holds {} pending images", device.id, device.pending_images),
                to_value(&device)?,
            ))
        }
        Action::Ack {
            device_id,
            image_name,
        } => {
            let ack = engine.ingestor().acknowledge_for(device_id, image_name, now)?;
            let detail = match &ack {
                TransferAck::MissingChunks(missing) => {
                    format!("resend requested for chunks {missing:?}")
                }
                TransferAck::Ok {
                    next_wake: Some(wake),
                } => format!("ACK_OK, next wake {}", wake.to_rfc3339()),
                TransferAck::Ok { next_wake: None } => "ACK_OK, no wake scheduled".to_owned(),
            };
            Ok((detail, to_value(&ack)?))
        }
        Action::Sweep => {
            let report = engine.reclaimer().sweep_stale(now);
            Ok((
                format!(
                    "cleared {}, skipped {}",
                    report.cleared.len(),
                    report.skipped.len()
                ),
                to_value(&report)?,
            ))
        }
        Action::ClearStale {
            device_id,
            age_hours,
        } => {
            let result = engine.reclaimer().clear_stale_for_device(
                device_id,
                age_hours.unwrap_or(DEFAULT_MANUAL_AGE_HOURS),
                now,
            );
            Ok((
                format!("cleared {} for {device_id}", result.count),
                to_value(&result)?,
            ))
        }
        Action::SetCadence { site_id, cadence } => {
            let site = engine.set_site_cadence(site_id, cadence.clone())?;
            let verb = if site.cadence.is_some() { "set" } else { "cleared" };
            Ok((format!("cadence {verb} for site {}", site.id), to_value(&site)?))
        }
        Action::Tick => {
            let report = engine.scheduler().run_tick(now);
            Ok((
                format!(
                    "issued {} snapshot commands, {} sites failed",
                    report.issued.len(),
                    report.failed.len()
                ),
                to_value(&report)?,
            ))
        }
    }
}

fn outcome_word(outcome: ChunkOutcome) -> &'static str {
    match outcome {
        ChunkOutcome::Accepted => "accepted",
        ChunkOutcome::Duplicate => "duplicate",
        ChunkOutcome::Completed => "completed the transfer",
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, CoreError> {
    serde_json::to_value(value).map_err(|e| CoreError::Internal(e.to_string()))
}
