//! Command dispatch: bridges CLI args -> engine operations -> output formatting.

pub mod cadence;
pub mod config_cmd;
pub mod replay;
pub mod run;
pub mod scenario;
pub mod sweep;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch an engine-bound command to the appropriate handler.
pub async fn dispatch(cmd: &Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(args, global).await,
        Command::Replay(args) => replay::handle(args, global),
        Command::Sweep(args) => sweep::handle(args, global),
        Command::Cadence(args) => cadence::handle(args, global),
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal {
            message: "command dispatched twice".into(),
        }),
    }
}
