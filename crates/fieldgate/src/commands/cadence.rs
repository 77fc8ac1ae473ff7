//! `fieldgate cadence`: validate a cadence and list its due instants.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use fieldgate_core::{Cadence, SiteCadenceConfig};

use crate::cli::{CadenceArgs, CadenceCommand, CadenceFlags, GlobalOpts};
use crate::error::CliError;
use crate::output::{self, paint_status};

use super::util::{self, OutputOpts};

#[derive(Debug, Serialize)]
struct DueInstant {
    #[serde(skip)]
    n: usize,
    utc: DateTime<Utc>,
    local: String,
}

#[derive(Tabled)]
struct DueRow {
    #[tabled(rename = "#")]
    n: usize,
    #[tabled(rename = "UTC")]
    utc: String,
    #[tabled(rename = "Local")]
    local: String,
}

#[derive(Debug, Serialize)]
struct CadenceSummary {
    valid: bool,
    interval_secs: u64,
    interval: String,
    timezone: String,
}

fn to_config(flags: &CadenceFlags) -> SiteCadenceConfig {
    SiteCadenceConfig {
        snapshots_per_day: flags.per_day,
        hours_between: flags.hours,
        timezone: flags.tz.clone(),
    }
}

pub fn handle(args: &CadenceArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config(global)?;
    let out = OutputOpts::resolve(global, &cfg)?;
    let fallback_tz = cfg.to_engine_config()?.default_timezone;

    match &args.command {
        CadenceCommand::Next {
            cadence,
            from,
            count,
        } => {
            let cadence = Cadence::from_config(&to_config(cadence), fallback_tz)?;
            let from = util::parse_instant("from", from.as_deref())?;
            let tz = cadence.timezone();
            let due: Vec<DueInstant> = cadence
                .upcoming(from, *count)
                .into_iter()
                .enumerate()
                .map(|(i, utc)| DueInstant {
                    n: i + 1,
                    utc,
                    local: utc.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string(),
                })
                .collect();

            let rendered = output::render_list(
                out.format,
                &due,
                |d| DueRow {
                    n: d.n,
                    utc: d.utc.to_rfc3339(),
                    local: d.local.clone(),
                },
                |d| d.utc.to_rfc3339(),
            )?;
            out.print(&rendered);
        }
        CadenceCommand::Validate { cadence } => {
            let cadence = Cadence::from_config(&to_config(cadence), fallback_tz)?;
            let secs = cadence.interval().num_seconds().unsigned_abs();
            let summary = CadenceSummary {
                valid: true,
                interval_secs: secs,
                interval: humantime::format_duration(Duration::from_secs(secs)).to_string(),
                timezone: cadence.timezone().name().to_owned(),
            };
            let rendered = output::render_single(
                out.format,
                &summary,
                |s| {
                    format!(
                        "{}: every {} from local midnight ({})",
                        paint_status("valid", out.color),
                        s.interval,
                        s.timezone
                    )
                },
                |s| s.interval_secs.to_string(),
            )?;
            out.print(&rendered);
        }
    }
    Ok(())
}
