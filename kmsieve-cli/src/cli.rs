//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use kmsieve_core::config::{DEFAULT_CONFIG_PATH, KmsieveConfig};
use kmsieve_core::error::KmsieveError;

/// kmsieve -- operator tool for the kernel log pre-filter.
///
/// Use `kmsieve <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "kmsieve", version, about, long_about = None)]
pub struct Cli {
    /// Path to the kmsieve.toml configuration file.
    ///
    /// Defaults to /etc/kmsieve/kmsieve.toml; a missing default file means
    /// built-in defaults.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level for diagnostics on stderr (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Where to load the configuration from.
    pub fn config_source(&self) -> ConfigSource {
        match &self.config {
            Some(path) => ConfigSource {
                path: path.clone(),
                required: true,
            },
            None => ConfigSource {
                path: PathBuf::from(DEFAULT_CONFIG_PATH),
                required: false,
            },
        }
    }
}

/// Configuration file location and whether it must exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub required: bool,
}

impl ConfigSource {
    /// Load the effective configuration (file or defaults, then env overrides).
    pub async fn load(&self) -> Result<KmsieveConfig, KmsieveError> {
        KmsieveConfig::load_or_default(&self.path, self.required).await
    }
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate and try out filter rules.
    Rules(RulesArgs),

    /// Inspect or reset the checkpoint.
    Checkpoint(CheckpointArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- rules ----

/// Validate and try out filter rules.
#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// Parse a rule file and report its rules.
    Validate {
        /// Rule file (default: `filter.rules_path` from the configuration).
        path: Option<PathBuf>,
    },
    /// Evaluate a message against the rules and show the decision path.
    Test {
        /// Rule file (default: `filter.rules_path` from the configuration).
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Match against the whole message instead of the first line only.
        #[arg(long)]
        whole_message: bool,

        /// Message lines: one primary line, then optional continuation lines.
        #[arg(required = true, allow_hyphen_values = true)]
        message: Vec<String>,
    },
}

// ---- checkpoint ----

/// Inspect or reset the checkpoint.
#[derive(Args, Debug)]
pub struct CheckpointArgs {
    #[command(subcommand)]
    pub action: CheckpointAction,
}

#[derive(Subcommand, Debug)]
pub enum CheckpointAction {
    /// Show the stored sequence number.
    Show {
        /// Checkpoint file (default: `checkpoint.path` from the configuration).
        path: Option<PathBuf>,
    },
    /// Overwrite the stored sequence number.
    Set {
        /// Next sequence number the daemon should forward.
        value: u64,

        /// Checkpoint file (default: `checkpoint.path` from the configuration).
        path: Option<PathBuf>,

        /// Write even while a daemon holds the instance lock.
        #[arg(long)]
        force: bool,
    },
}

// ---- config ----

/// Manage kmsieve configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, source, filter, checkpoint, dump, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}
