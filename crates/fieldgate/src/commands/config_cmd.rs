//! Config subcommand handlers.

use fieldgate_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util::{self, OutputOpts};

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match &args.command {
        ConfigCommand::Show => {
            let cfg = util::load_config(global)?;
            let out = OutputOpts::resolve(global, &cfg)?;
            let rendered = match out.format {
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&cfg)?,
                format => output::render_single(format, &cfg, |_| String::new(), |_| String::new())?,
            };
            out.print(&rendered);
        }

        ConfigCommand::Path => {
            output::print_output(&util::config_path(global).display().to_string(), global.quiet);
        }

        ConfigCommand::Init { force } => {
            let path = util::config_path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            config::save_config_to(&Config::default(), &path)?;
            output::print_output(
                &format!("Wrote default config to {}", path.display()),
                global.quiet,
            );
        }
    }
    Ok(())
}
