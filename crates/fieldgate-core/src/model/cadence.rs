// ── Site cadence configuration ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity_id::EntityId;

/// Snapshots-per-day values an administrator may choose.
pub const ALLOWED_SNAPSHOTS_PER_DAY: [u32; 10] = [1, 2, 3, 4, 6, 8, 12, 24, 48, 96];

/// Inclusive bounds for `hours_between`.
pub const MIN_HOURS_BETWEEN: f64 = 0.25;
pub const MAX_HOURS_BETWEEN: f64 = 24.0;

/// Per-site snapshot cadence as written by an administrator.
///
/// At least one of `snapshots_per_day` / `hours_between` must be set; when
/// both are set they must describe the same interval. A missing timezone
/// falls back to the engine default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteCadenceConfig {
    #[serde(default)]
    pub snapshots_per_day: Option<u32>,
    #[serde(default)]
    pub hours_between: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl SiteCadenceConfig {
    pub fn per_day(n: u32) -> Self {
        Self {
            snapshots_per_day: Some(n),
            ..Self::default()
        }
    }

    pub fn every_hours(hours: f64) -> Self {
        Self {
            hours_between: Some(hours),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = Some(tz.into());
        self
    }
}

/// Request to generate a snapshot for one site. Emitted once per claimed
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCommand {
    pub site_id: EntityId,
    /// The cadence boundary this snapshot covers.
    pub boundary: DateTime<Utc>,
    /// When the scheduler tick that claimed the boundary ran.
    pub issued_at: DateTime<Utc>,
}

/// A site the scheduler could not evaluate on one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteFailure {
    pub site_id: EntityId,
    pub reason: String,
}

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub issued: Vec<SnapshotCommand>,
    pub failed: Vec<SiteFailure>,
}
