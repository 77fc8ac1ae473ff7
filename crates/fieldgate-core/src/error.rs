// ── Core error types ──
//
// Every failure is scoped to one entity. Batch operations (sweeps,
// scheduler ticks) collect these into their reports instead of aborting.

use thiserror::Error;

use crate::model::{DeviceId, EntityId, TransferState};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Hierarchy errors ─────────────────────────────────────────────
    #[error("Unknown site: {site_id}")]
    UnknownSite { site_id: EntityId },

    #[error("Unknown program: {program_id}")]
    UnknownProgram { program_id: EntityId },

    #[error("Unknown company: {company_id}")]
    UnknownCompany { company_id: EntityId },

    #[error("Device not found: {device}")]
    DeviceNotFound { device: DeviceId },

    // ── Transfer errors ──────────────────────────────────────────────
    #[error("Transfer not found: {transfer_id}")]
    TransferNotFound { transfer_id: EntityId },

    #[error("Transfer {transfer_id} is already {state}")]
    AlreadyTerminal {
        transfer_id: EntityId,
        state: TransferState,
    },

    #[error("Chunk {index} out of range for transfer {transfer_id} ({total} chunks)")]
    ChunkOutOfRange {
        transfer_id: EntityId,
        index: u32,
        total: u32,
    },

    #[error("Transfer {transfer_id} changed concurrently: {detail}")]
    ConcurrentTransitionLost { transfer_id: EntityId, detail: String },

    // ── Cadence errors ───────────────────────────────────────────────
    #[error("Invalid cadence configuration: {reason}")]
    InvalidCadenceConfig { reason: String },

    // ── Input / configuration errors ─────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// True for outcomes that are no-ops rather than failures: a late or
    /// duplicate action against a transfer that already finished.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyTerminal { .. })
    }

    pub(crate) fn invalid_cadence(reason: impl Into<String>) -> Self {
        Self::InvalidCadenceConfig {
            reason: reason.into(),
        }
    }
}
