// ── Runtime engine configuration ──
//
// These types describe *how* the engine schedules its periodic work.
// They never touch disk: the CLI builds an `EngineConfig` from the
// figment-loaded file and hands it in.

use std::time::Duration;

use chrono_tz::Tz;

/// Default inactivity threshold before a non-terminal transfer is stale.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// Default period of the automatic stale sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Longest accepted period for the automatic stale sweep.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default period of the cadence scheduler tick.
pub const DEFAULT_CADENCE_TICK: Duration = Duration::from_secs(15 * 60);

/// Human-readable reason stamped on transfers the automatic sweep fails.
pub const STALE_REASON: &str = "stale — no progress within threshold";

/// Configuration for one engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How often the automatic stale sweep runs. Zero disables it.
    pub sweep_interval: Duration,
    /// Inactivity after which a pending/receiving transfer is reclaimed.
    pub stale_threshold: Duration,
    /// How often the cadence scheduler evaluates every site. Zero disables it.
    pub cadence_tick: Duration,
    /// Timezone for sites whose cadence names none.
    pub default_timezone: Tz,
    /// Capacity of the engine event broadcast.
    pub event_channel_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            cadence_tick: DEFAULT_CADENCE_TICK,
            default_timezone: Tz::UTC,
            event_channel_size: 256,
        }
    }
}
