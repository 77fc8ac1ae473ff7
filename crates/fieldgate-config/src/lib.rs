//! Configuration for the fieldgate CLI.
//!
//! TOML config file + environment overrides loaded with figment, tenant seed
//! files, and translation to `fieldgate_core::EngineConfig`. Seeds are
//! applied through the engine's own write gates, so a bad seed fails with
//! the same errors a runtime write would.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use fieldgate_core::config::MAX_SWEEP_INTERVAL;
use fieldgate_core::{Company, CoreError, DeviceWrite, Engine, EngineConfig, Program, SiteWrite};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse seed file: {0}")]
    SeedParse(#[from] toml::de::Error),

    #[error("seed rejected at {entity}: {source}")]
    Seed {
        entity: String,
        #[source]
        source: CoreError,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Periodic executor settings.
    #[serde(default)]
    pub engine: EngineSection,

    /// Output defaults for the CLI.
    #[serde(default)]
    pub output: OutputSection,

    /// Seed file loaded by `fieldgate run` when `--seed` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineSection {
    /// Seconds between automatic stale sweeps. 0 disables the sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Seconds without progress before a transfer is stale.
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_secs: u64,

    /// Seconds between cadence scheduler ticks. 0 disables the scheduler.
    #[serde(default = "default_cadence_tick")]
    pub cadence_tick_secs: u64,

    /// IANA timezone for sites whose cadence names none.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    #[serde(default = "default_event_channel_size")]
    pub event_channel_size: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            stale_threshold_secs: default_stale_threshold(),
            cadence_tick_secs: default_cadence_tick(),
            default_timezone: default_timezone(),
            event_channel_size: default_event_channel_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutputSection {
    #[serde(default = "default_output")]
    pub format: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            format: default_output(),
            color: default_color(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    3600
}
fn default_stale_threshold() -> u64 {
    3600
}
fn default_cadence_tick() -> u64 {
    900
}
fn default_timezone() -> String {
    "UTC".into()
}
fn default_event_channel_size() -> usize {
    256
}
fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

impl Config {
    /// Translate the `[engine]` section into the core's runtime config.
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let section = &self.engine;
        if section.stale_threshold_secs == 0 {
            return Err(ConfigError::Validation {
                field: "engine.stale_threshold_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }
        let sweep_interval = Duration::from_secs(section.sweep_interval_secs);
        if sweep_interval > MAX_SWEEP_INTERVAL {
            return Err(ConfigError::Validation {
                field: "engine.sweep_interval_secs".into(),
                reason: format!(
                    "the stale sweep must run at least every {}s (0 disables it), got {}",
                    MAX_SWEEP_INTERVAL.as_secs(),
                    section.sweep_interval_secs
                ),
            });
        }
        let default_timezone: Tz =
            section
                .default_timezone
                .parse()
                .map_err(|_| ConfigError::Validation {
                    field: "engine.default_timezone".into(),
                    reason: format!("unknown timezone '{}'", section.default_timezone),
                })?;

        Ok(EngineConfig {
            sweep_interval,
            stale_threshold: Duration::from_secs(section.stale_threshold_secs),
            cadence_tick: Duration::from_secs(section.cadence_tick_secs),
            default_timezone,
            event_channel_size: section.event_channel_size,
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "fieldgate", "fieldgate").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fieldgate");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from defaults, then `path` (if it exists), then
/// `FIELDGATE_`-prefixed environment variables. Nested keys use a double
/// underscore: `FIELDGATE_ENGINE__STALE_THRESHOLD_SECS=1800`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FIELDGATE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Seed files ──────────────────────────────────────────────────────

/// Tenant hierarchy and devices to load at startup.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Seed {
    #[serde(default)]
    pub companies: Vec<Company>,
    #[serde(default)]
    pub programs: Vec<Program>,
    #[serde(default)]
    pub sites: Vec<SiteWrite>,
    #[serde(default)]
    pub devices: Vec<DeviceWrite>,
}

/// Counts of what a seed wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub companies: usize,
    pub programs: usize,
    pub sites: usize,
    pub devices: usize,
}

impl Seed {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Write the seed into `engine` top-down. Stops at the first rejected
    /// entity; everything before it stays written.
    pub fn apply(&self, engine: &Engine) -> Result<SeedSummary, ConfigError> {
        for company in &self.companies {
            engine.add_company(company.clone());
        }
        for program in &self.programs {
            engine
                .add_program(program.clone())
                .map_err(rejected("program", &program.id))?;
        }
        for site in &self.sites {
            engine
                .add_site(site.clone())
                .map_err(rejected("site", &site.id))?;
        }
        for device in &self.devices {
            engine
                .write_device(device.clone())
                .map_err(rejected("device", &device.id))?;
        }

        Ok(SeedSummary {
            companies: self.companies.len(),
            programs: self.programs.len(),
            sites: self.sites.len(),
            devices: self.devices.len(),
        })
    }
}

fn rejected(kind: &str, id: &dyn fmt::Display) -> impl FnOnce(CoreError) -> ConfigError + use<> {
    let entity = format!("{kind} '{id}'");
    move |source| ConfigError::Seed { entity, source }
}
