//! `fieldgate run`: the periodic executor in the foreground.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use fieldgate_core::EngineEvent;

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;

use super::util::{self, OutputOpts};

pub async fn handle(args: &RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config(global)?;
    let out = OutputOpts::resolve(global, &cfg)?;
    let duration = args
        .duration
        .as_deref()
        .map(humantime::parse_duration)
        .transpose()
        .map_err(|e| CliError::Validation {
            field: "duration".into(),
            reason: e.to_string(),
        })?;

    let engine = util::build_engine(&cfg, args.seed.as_deref())?;
    let mut events = engine.events();
    engine.start().await;

    let stop = wait_for_stop(duration);
    tokio::pin!(stop);
    loop {
        tokio::select! {
            () = &mut stop => break,
            received = events.recv() => match received {
                Ok(event) => report(&event, out),
                Err(RecvError::Lagged(missed)) => warn!(missed, "event log fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("shutting down");
    engine.shutdown().await;
    Ok(())
}

/// Resolve on Ctrl-C, or when `duration` elapses if one was given.
async fn wait_for_stop(duration: Option<Duration>) {
    match duration {
        Some(limit) => {
            tokio::select! {
                () = tokio::time::sleep(limit) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

/// One JSON line per event on stdout.
fn report(event: &EngineEvent, out: OutputOpts) {
    match serde_json::to_string(event) {
        Ok(line) => out.print(&line),
        Err(e) => warn!(error = %e, "could not serialize engine event"),
    }
}
