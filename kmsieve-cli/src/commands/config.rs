//! `kmsieve config` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use crate::cli::{ConfigAction, ConfigArgs, ConfigSource};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Sections accepted by `config show --section`.
pub const SECTIONS: [&str; 6] = ["general", "source", "filter", "checkpoint", "dump", "metrics"];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config: &ConfigSource,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config, writer).await,
        ConfigAction::Show { section } => {
            let report = build_show_report(config, section.as_deref()).await?;
            writer.render(&report)
        }
    }
}

/// Execute the config validate subcommand.
///
/// Loads the file the daemon would load, applies `KMSIEVE_*` overrides and
/// validates the result.
///
/// # Errors
///
/// Returns `CliError::Config` if validation fails (parse errors, invalid values,
/// explicit path missing).
async fn execute_validate(config: &ConfigSource, writer: &OutputWriter) -> Result<(), CliError> {
    let report = validate(config).await;
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

/// Build the validation report for a configuration source.
pub async fn validate(config: &ConfigSource) -> ConfigValidationReport {
    info!(path = %config.path.display(), "validating configuration");

    let source = source_label(config);
    match config.load().await {
        Ok(_) => ConfigValidationReport {
            source,
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source,
            valid: false,
            errors: vec![e.to_string()],
        },
    }
}

/// Build the effective configuration report (file + env overrides + defaults).
///
/// # Errors
///
/// Returns `CliError::Core` if loading fails or `CliError::Command` if the
/// section name is unknown.
pub async fn build_show_report(
    config: &ConfigSource,
    section: Option<&str>,
) -> Result<ConfigReport, CliError> {
    info!(path = %config.path.display(), "loading configuration");

    let loaded = config.load().await?;

    let config_toml = match section {
        None => to_toml(&loaded),
        Some("general") => to_toml(&loaded.general),
        Some("source") => to_toml(&loaded.source),
        Some("filter") => to_toml(&loaded.filter),
        Some("checkpoint") => to_toml(&loaded.checkpoint),
        Some("dump") => to_toml(&loaded.dump),
        Some("metrics") => to_toml(&loaded.metrics),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: {})",
                other,
                SECTIONS.join(", ")
            )));
        }
    };

    Ok(ConfigReport {
        source: source_label(config),
        section: section.map(str::to_owned),
        config_toml,
    })
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {})", e))
}

fn source_label(config: &ConfigSource) -> String {
    if config.required || config.path.exists() {
        config.path.display().to_string()
    } else {
        format!("{} (absent, defaults)", config.path.display())
    }
}

/// Configuration display report.
///
/// The `config_toml` field is skipped during JSON serialization (only used for text rendering).
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Serialized TOML configuration
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_report_render_text_full_config() {
        let report = ConfigReport {
            source: "kmsieve.toml".to_owned(),
            section: None,
            config_toml: "[general]\nlog_level = \"info\"".to_owned(),
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("Configuration"), "should contain header");
        assert!(
            output.contains("kmsieve.toml"),
            "should contain source filename"
        );
        assert!(
            output.contains("log_level"),
            "should contain config content"
        );
    }

    #[test]
    fn test_config_report_render_text_specific_section() {
        let report = ConfigReport {
            source: "/etc/kmsieve/kmsieve.toml".to_owned(),
            section: Some("filter".to_owned()),
            config_toml: "mode = \"whole-message\"".to_owned(),
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("[filter]"), "should show section name");
        assert!(output.contains("whole-message"), "should show config content");
    }

    #[test]
    fn test_config_report_json_serialization() {
        let report = ConfigReport {
            source: "kmsieve.toml".to_owned(),
            section: Some("checkpoint".to_owned()),
            config_toml: "path = \"/var/lib/kmsieve/checkpoint\"".to_owned(),
        };

        let json = serde_json::to_string(&report).expect("JSON serialization should succeed");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("should parse JSON");

        assert_eq!(parsed["source"].as_str(), Some("kmsieve.toml"));
        assert_eq!(parsed["section"].as_str(), Some("checkpoint"));
        assert!(
            parsed.get("config_toml").is_none(),
            "config_toml should be skipped"
        );
    }

    #[test]
    fn test_config_validation_report_valid() {
        let report = ConfigValidationReport {
            source: "kmsieve.toml".to_owned(),
            valid: true,
            errors: Vec::new(),
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("VALID"), "should show valid status");
        assert!(!output.contains("Error:"), "should not show errors");
    }

    #[test]
    fn test_config_validation_report_invalid_multiple_errors() {
        let report = ConfigValidationReport {
            source: "bad.toml".to_owned(),
            valid: false,
            errors: vec![
                "error 1: read_buffer_size too small".to_owned(),
                "error 2: marker must be one character".to_owned(),
            ],
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("INVALID"), "should show invalid status");
        assert!(output.contains("error 1"), "should show first error");
        assert!(output.contains("error 2"), "should show second error");
    }

    #[test]
    fn test_config_validation_report_json_invalid() {
        let report = ConfigValidationReport {
            source: "bad.toml".to_owned(),
            valid: false,
            errors: vec!["error message".to_owned()],
        };

        let json = serde_json::to_string(&report).expect("JSON serialization should succeed");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("should parse JSON");

        assert_eq!(parsed["valid"].as_bool(), Some(false));
        assert_eq!(
            parsed["errors"].as_array().expect("should be array").len(),
            1
        );
    }

    #[test]
    fn test_config_report_unicode_in_source_path() {
        let report = ConfigReport {
            source: "/path/to/設定.toml".to_owned(),
            section: None,
            config_toml: "test = true".to_owned(),
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("unicode path should render");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("設定.toml"), "should handle unicode paths");
    }
}
