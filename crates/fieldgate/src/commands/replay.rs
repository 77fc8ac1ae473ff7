//! `fieldgate replay`: run a scenario and report each step.

use tabled::Tabled;

use crate::cli::{GlobalOpts, ReplayArgs};
use crate::error::CliError;
use crate::output::{self, paint_status};

use super::scenario::{Scenario, StepResult};
use super::util::{self, OutputOpts};

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    step: usize,
    #[tabled(rename = "At")]
    at: String,
    #[tabled(rename = "Op")]
    op: &'static str,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

pub fn handle(args: &ReplayArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config(global)?;
    let out = OutputOpts::resolve(global, &cfg)?;
    let scenario = Scenario::load(&args.scenario)?;
    let engine = util::build_engine(&cfg, args.seed.as_deref())?;

    let results = scenario.replay(&engine)?;
    let rendered = output::render_list(
        out.format,
        &results,
        |r: &StepResult| StepRow {
            step: r.step,
            at: r.at.format("%Y-%m-%d %H:%M:%S").to_string(),
            op: r.op,
            status: paint_status(r.status.as_str(), out.color),
            detail: r.detail.clone(),
        },
        |r| format!("{}\t{}\t{}\t{}", r.step, r.op, r.status.as_str(), r.detail),
    )?;
    out.print(&rendered);
    Ok(())
}
