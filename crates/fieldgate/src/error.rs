//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use fieldgate_config::ConfigError;
use fieldgate_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(fieldgate::not_found),
        help("Register it in the seed file or scenario before referring to it.")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    #[error("{message}")]
    #[diagnostic(code(fieldgate::conflict))]
    Conflict { message: String },

    // ── Cadence ──────────────────────────────────────────────────────
    #[error("Invalid cadence: {reason}")]
    #[diagnostic(
        code(fieldgate::invalid_cadence),
        help(
            "Set --per-day to one of 1, 2, 3, 4, 6, 8, 12, 24, 48, 96\n\
             or --hours to a value between 0.25 and 24."
        )
    )]
    InvalidCadence { reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fieldgate::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(fieldgate::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error("Seed rejected at {entity}")]
    #[diagnostic(
        code(fieldgate::seed),
        help("Entities are applied companies, programs, sites, devices; parents must come first.")
    )]
    Seed {
        entity: String,
        #[source]
        source: CoreError,
    },

    #[error(transparent)]
    #[diagnostic(code(fieldgate::config))]
    Config(ConfigError),

    #[error("Invalid scenario {path}: {source}")]
    #[diagnostic(
        code(fieldgate::scenario),
        help("A scenario is a JSON object with optional hierarchy lists and a `steps` array.")
    )]
    Scenario {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Internal error: {message}")]
    #[diagnostic(code(fieldgate::internal))]
    Internal { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(fieldgate::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(fieldgate::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(fieldgate::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } | Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::InvalidCadence { .. } | Self::Validation { .. } => exit_code::USAGE,
            Self::Seed { source, .. } => match source {
                CoreError::InvalidCadenceConfig { .. } | CoreError::ValidationFailed { .. } => {
                    exit_code::USAGE
                }
                _ => exit_code::GENERAL,
            },
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownSite { site_id } => CliError::NotFound {
                resource_type: "site".into(),
                identifier: site_id.to_string(),
            },
            CoreError::UnknownProgram { program_id } => CliError::NotFound {
                resource_type: "program".into(),
                identifier: program_id.to_string(),
            },
            CoreError::UnknownCompany { company_id } => CliError::NotFound {
                resource_type: "company".into(),
                identifier: company_id.to_string(),
            },
            CoreError::DeviceNotFound { device } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: device.to_string(),
            },
            CoreError::TransferNotFound { transfer_id } => CliError::NotFound {
                resource_type: "transfer".into(),
                identifier: transfer_id.to_string(),
            },

            err @ (CoreError::AlreadyTerminal { .. }
            | CoreError::ConcurrentTransitionLost { .. }) => CliError::Conflict {
                message: err.to_string(),
            },

            CoreError::InvalidCadenceConfig { reason } => CliError::InvalidCadence { reason },

            err @ CoreError::ChunkOutOfRange { .. } => CliError::Validation {
                field: "chunk index".into(),
                reason: err.to_string(),
            },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Config { message } | CoreError::Internal(message) => {
                CliError::Internal { message }
            }
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Seed { entity, source } => CliError::Seed { entity, source },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other),
        }
    }
}
