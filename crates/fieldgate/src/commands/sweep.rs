//! `fieldgate sweep`: operator stale sweep for one device.

use std::fmt::Write as _;

use tabled::{Table, Tabled, settings::Style};
use tracing::debug;

use fieldgate_core::{ClearedTransfer, DeviceId, ManualSweepResult};

use crate::cli::{GlobalOpts, SweepArgs};
use crate::error::CliError;
use crate::output;

use super::scenario::Scenario;
use super::util::{self, OutputOpts};

#[derive(Tabled)]
struct ClearedRow {
    #[tabled(rename = "Transfer")]
    transfer: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Chunks")]
    chunks: String,
    #[tabled(rename = "Idle (min)")]
    idle_minutes: i64,
}

impl From<&ClearedTransfer> for ClearedRow {
    fn from(c: &ClearedTransfer) -> Self {
        Self {
            transfer: c.transfer_id.to_string(),
            image: c.image.clone(),
            chunks: format!("{}/{}", c.received_chunks, c.total_chunks),
            idle_minutes: c.age_minutes,
        }
    }
}

fn detail(device: &DeviceId, result: &ManualSweepResult) -> String {
    if result.count == 0 {
        return format!("No stale transfers for {device}");
    }
    let rows: Vec<ClearedRow> = result.cleared_images.iter().map(ClearedRow::from).collect();
    let mut out = Table::new(rows).with(Style::rounded()).to_string();
    let _ = write!(out, "\nCleared {} transfer(s) for {device}", result.count);
    out
}

pub fn handle(args: &SweepArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config(global)?;
    let out = OutputOpts::resolve(global, &cfg)?;
    let scenario = Scenario::load(&args.scenario)?;
    let at = util::parse_instant("at", args.at.as_deref())?;
    let engine = util::build_engine(&cfg, args.seed.as_deref())?;

    let replayed = scenario.replay(&engine)?;
    debug!(steps = replayed.len(), "scenario replayed before sweep");

    let device = DeviceId::new(&args.device);
    let result = engine
        .reclaimer()
        .clear_stale_for_device(&device, args.age_hours, at);

    let rendered = output::render_single(
        out.format,
        &result,
        |r| detail(&device, r),
        |r| {
            r.cleared_images
                .iter()
                .map(|c| c.transfer_id.to_string())
                .collect::<Vec<_>>()
                .join("\n")
        },
    )?;
    out.print(&rendered);
    Ok(())
}
