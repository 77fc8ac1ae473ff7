//! Shared helpers for command handlers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use tracing::info;

use fieldgate_config::{self as config, Config, Seed};
use fieldgate_core::Engine;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// Config file path: `--config` when given, else the platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

/// Load config from `--config` (or the platform default) plus environment.
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(config::load_config_from(&config_path(global))?)
}

/// Output settings after merging CLI flags over the `[output]` section.
#[derive(Debug, Clone, Copy)]
pub struct OutputOpts {
    pub format: OutputFormat,
    pub color: bool,
    pub quiet: bool,
}

impl OutputOpts {
    pub fn resolve(global: &GlobalOpts, cfg: &Config) -> Result<Self, CliError> {
        let format = match global.output {
            Some(format) => format,
            None => OutputFormat::from_str(&cfg.output.format, true).map_err(|reason| {
                CliError::Validation {
                    field: "output.format".into(),
                    reason,
                }
            })?,
        };
        let color = match global.color {
            Some(mode) => mode,
            None => ColorMode::from_str(&cfg.output.color, true).map_err(|reason| {
                CliError::Validation {
                    field: "output.color".into(),
                    reason,
                }
            })?,
        };
        Ok(Self {
            format,
            color: output::should_color(color),
            quiet: global.quiet,
        })
    }

    pub fn print(&self, rendered: &str) {
        output::print_output(rendered, self.quiet);
    }
}

/// Build an engine from `[engine]` and load the seed file: `seed` when
/// given, else the one named in config.
pub fn build_engine(cfg: &Config, seed: Option<&Path>) -> Result<Engine, CliError> {
    let engine = Engine::new(cfg.to_engine_config()?);
    if let Some(path) = seed.or(cfg.seed.as_deref()) {
        let summary = Seed::load(path)?.apply(&engine)?;
        info!(
            path = %path.display(),
            companies = summary.companies,
            programs = summary.programs,
            sites = summary.sites,
            devices = summary.devices,
            "seed loaded"
        );
    }
    Ok(engine)
}

/// Parse an RFC 3339 instant, or take the current time when absent.
pub fn parse_instant(field: &str, value: Option<&str>) -> Result<DateTime<Utc>, CliError> {
    let Some(raw) = value else {
        return Ok(Utc::now());
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CliError::Validation {
            field: field.into(),
            reason: format!("expected an RFC 3339 timestamp, got '{raw}': {e}"),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_offsets_into_utc() {
        let at = parse_instant("from", Some("2024-05-01T09:00:00+09:00")).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_instant("from", Some("yesterday")).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "from"));
    }
}
