//! CLI argument definitions for kmsieved.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.
//! Flags take precedence over both the config file and `KMSIEVE_*`
//! environment variables.

use std::path::{Path, PathBuf};

use clap::Parser;

use kmsieve_core::config::{DEFAULT_CONFIG_PATH, FilterMode, KmsieveConfig};

/// Kernel log pre-filter daemon.
///
/// Reads `/dev/kmsg`, forwards messages that pass the filter rules to
/// stdout and optionally archives the rest to a dump file.
#[derive(Parser, Debug)]
#[command(name = "kmsieved")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to kmsieve.toml configuration file.
    ///
    /// When omitted, the default path is tried and a missing file means
    /// built-in defaults. An explicitly given path must exist.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the rule file path.
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Override the checkpoint file path.
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Archive excluded messages to this file.
    #[arg(long)]
    pub dump: Option<PathBuf>,

    /// Override the kernel log device.
    #[arg(long)]
    pub device: Option<PathBuf>,

    /// Override the instance lock directory.
    #[arg(long)]
    pub lock_dir: Option<PathBuf>,

    /// Evaluate rules against whole messages (primary plus continuation lines).
    #[arg(long)]
    pub whole_message: bool,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and rule file, then exit without starting.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Config file path and whether it must exist.
    pub fn config_source(&self) -> (&Path, bool) {
        match &self.config {
            Some(path) => (path.as_path(), true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        }
    }

    /// Apply command-line overrides on top of a loaded configuration.
    ///
    /// The caller must re-run `validate()` afterwards.
    pub fn apply_overrides(&self, config: &mut KmsieveConfig) {
        if let Some(path) = &self.rules {
            config.filter.rules_path = path_string(path);
        }
        if let Some(path) = &self.checkpoint {
            config.checkpoint.path = path_string(path);
        }
        if let Some(path) = &self.dump {
            config.dump.path = path_string(path);
        }
        if let Some(path) = &self.device {
            config.source.device = path_string(path);
        }
        if let Some(path) = &self.lock_dir {
            config.general.lock_dir = path_string(path);
        }
        if self.whole_message {
            config.filter.mode = FilterMode::WholeMessage;
        }
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_verify_command_structure() {
        DaemonCli::command().debug_assert();
        assert_eq!(DaemonCli::command().get_name(), "kmsieved");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = DaemonCli::try_parse_from(["kmsieved"]).expect("parse succeeded");
        assert!(cli.config.is_none());
        assert!(!cli.whole_message);
        assert!(!cli.validate);

        let (path, required) = cli.config_source();
        assert_eq!(path, Path::new(DEFAULT_CONFIG_PATH));
        assert!(!required, "default config path should be optional");
    }

    #[test]
    fn test_cli_explicit_config_is_required() {
        let cli = DaemonCli::try_parse_from(["kmsieved", "-c", "/tmp/k.toml"])
            .expect("parse succeeded");
        let (path, required) = cli.config_source();
        assert_eq!(path, Path::new("/tmp/k.toml"));
        assert!(required);
    }

    #[test]
    fn test_cli_overrides_replace_config_values() {
        let cli = DaemonCli::try_parse_from([
            "kmsieved",
            "--rules",
            "/tmp/rules",
            "--checkpoint",
            "/tmp/seq",
            "--dump",
            "/tmp/excluded",
            "--device",
            "/tmp/kmsg",
            "--lock-dir",
            "/tmp/kmsieve.lock",
            "--whole-message",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
        ])
        .expect("parse succeeded");

        let mut config = KmsieveConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.filter.rules_path, "/tmp/rules");
        assert_eq!(config.checkpoint.path, "/tmp/seq");
        assert_eq!(config.dump.path, "/tmp/excluded");
        assert_eq!(config.source.device, "/tmp/kmsg");
        assert_eq!(config.general.lock_dir, "/tmp/kmsieve.lock");
        assert_eq!(config.filter.mode, FilterMode::WholeMessage);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "pretty");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_without_flags_keeps_config() {
        let cli = DaemonCli::try_parse_from(["kmsieved"]).expect("parse succeeded");
        let mut config = KmsieveConfig::default();
        config.filter.mode = FilterMode::WholeMessage;
        cli.apply_overrides(&mut config);

        let defaults = KmsieveConfig::default();
        assert_eq!(config.filter.mode, FilterMode::WholeMessage);
        assert_eq!(config.filter.rules_path, defaults.filter.rules_path);
        assert_eq!(config.general.log_level, defaults.general.log_level);
    }

    #[test]
    fn test_cli_invalid_log_level_fails_validation() {
        let cli = DaemonCli::try_parse_from(["kmsieved", "--log-level", "loud"])
            .expect("parse succeeded");
        let mut config = KmsieveConfig::default();
        cli.apply_overrides(&mut config);
        assert!(config.validate().is_err());
    }
}
