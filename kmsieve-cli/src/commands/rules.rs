//! `kmsieve rules` command handler

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use kmsieve_core::config::FilterMode;
use kmsieve_pipeline::record::match_text;
use kmsieve_pipeline::rule::{IieEngine, RuleKind, RuleLoader};

use crate::cli::{ConfigSource, RulesAction, RulesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `rules` command.
pub async fn execute(
    args: RulesArgs,
    config: &ConfigSource,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        RulesAction::Validate { path } => {
            let path = resolve_rules_path(path, config).await?;
            execute_validate(&path, writer).await
        }
        RulesAction::Test {
            rules,
            whole_message,
            message,
        } => {
            let path = resolve_rules_path(rules, config).await?;
            let mode = if whole_message {
                FilterMode::WholeMessage
            } else {
                FilterMode::LeadingLine
            };
            let report = test_message(&path, mode, &message).await?;
            writer.render(&report)
        }
    }
}

async fn resolve_rules_path(
    explicit: Option<PathBuf>,
    config: &ConfigSource,
) -> Result<PathBuf, CliError> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(PathBuf::from(config.load().await?.filter.rules_path)),
    }
}

async fn execute_validate(path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let report = validate_file(path).await;
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Rule(format!("{} is invalid", path.display())));
    }
    Ok(())
}

/// Parse a rule file and summarize it. Never fails; problems land in `errors`.
pub async fn validate_file(path: &Path) -> RuleValidationReport {
    info!(path = %path.display(), "validating filter rules");

    let (engine, errors) = match RuleLoader::load_file(path).await {
        Ok(Some(engine)) => (engine, Vec::new()),
        Ok(None) => (
            IieEngine::new(),
            vec![format!("{}: file not found", path.display())],
        ),
        Err(e) => (IieEngine::new(), vec![e.to_string()]),
    };

    RuleValidationReport {
        path: path.display().to_string(),
        valid: errors.is_empty(),
        default_decision: decision_label(engine.default_decision()),
        rules: rule_entries(&engine),
        errors,
    }
}

/// Evaluate message lines against a rule file.
///
/// `lines[0]` is the primary line; the rest are continuation lines and only
/// take part in [`FilterMode::WholeMessage`]. A missing rule file means
/// pass-through, as in the daemon.
pub async fn test_message(
    path: &Path,
    mode: FilterMode,
    lines: &[String],
) -> Result<RuleTestReport, CliError> {
    let engine = RuleLoader::load_file(path).await?;
    let text = message_text(mode, lines);

    let (included, evaluated, flipped, default_decision) = match &engine {
        Some(engine) => {
            let trace = engine.trace(match_text(&text));
            (
                trace.included,
                trace.evaluated,
                trace.flipped,
                engine.default_decision(),
            )
        }
        None => (true, Vec::new(), Vec::new(), true),
    };

    let entries = engine.as_ref().map(rule_entries).unwrap_or_default();
    let pick = |indices: &[usize]| -> Vec<RuleEntry> {
        indices
            .iter()
            .filter_map(|&i| entries.get(i).cloned())
            .collect()
    };

    Ok(RuleTestReport {
        rules_path: path.display().to_string(),
        rules_loaded: engine.is_some(),
        mode: mode.to_string(),
        text: String::from_utf8_lossy(match_text(&text)).into_owned(),
        decision: decision_label(included),
        default_decision: decision_label(default_decision),
        evaluated: pick(&evaluated),
        flipped: pick(&flipped),
    })
}

/// Text the daemon would match for these lines in `mode`.
fn message_text(mode: FilterMode, lines: &[String]) -> Vec<u8> {
    let take = match mode {
        FilterMode::LeadingLine => 1,
        FilterMode::WholeMessage => lines.len(),
    };
    let mut text = Vec::new();
    for line in lines.iter().take(take) {
        text.extend_from_slice(line.as_bytes());
        text.push(b'\n');
    }
    text
}

fn rule_entries(engine: &IieEngine) -> Vec<RuleEntry> {
    engine
        .rules()
        .enumerate()
        .map(|(index, rule)| RuleEntry {
            index,
            kind: rule.kind(),
            pattern: rule.pattern().to_owned(),
        })
        .collect()
}

fn decision_label(included: bool) -> &'static str {
    if included { "include" } else { "exclude" }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleEntry {
    pub index: usize,
    pub kind: RuleKind,
    pub pattern: String,
}

#[derive(Debug, Serialize)]
pub struct RuleValidationReport {
    pub path: String,
    pub valid: bool,
    pub default_decision: &'static str,
    pub rules: Vec<RuleEntry>,
    pub errors: Vec<String>,
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule Validation: {}", self.path.bold())?;
        if self.valid {
            let includes = self
                .rules
                .iter()
                .filter(|r| r.kind == RuleKind::Include)
                .count();
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
            writeln!(
                w,
                "  Rules: {} total, {} include, {} exclude (default: {})",
                self.rules.len(),
                includes,
                self.rules.len() - includes,
                self.default_decision
            )?;
            for r in &self.rules {
                writeln!(w, "  {:>4}  {} /{}/", r.index + 1, r.kind.marker(), r.pattern)?;
            }
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct RuleTestReport {
    pub rules_path: String,
    pub rules_loaded: bool,
    pub mode: String,
    pub text: String,
    pub decision: &'static str,
    pub default_decision: &'static str,
    pub evaluated: Vec<RuleEntry>,
    pub flipped: Vec<RuleEntry>,
}

impl Render for RuleTestReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let decision = match self.decision {
            "include" => "INCLUDE".green().bold(),
            _ => "EXCLUDE".red().bold(),
        };
        writeln!(w, "Decision: {} ({} mode)", decision, self.mode)?;
        if !self.rules_loaded {
            writeln!(w, "  No rule file at {}, forwarding everything", self.rules_path)?;
            return Ok(());
        }
        writeln!(w, "  Default: {}", self.default_decision)?;
        writeln!(w, "  Evaluated: {}", self.evaluated.len())?;
        for r in &self.evaluated {
            let flipped = self.flipped.iter().any(|f| f.index == r.index);
            let mark = if flipped { "flip".yellow() } else { "    ".normal() };
            writeln!(
                w,
                "  {:>4}  {} /{}/ {}",
                r.index + 1,
                r.kind.marker(),
                r.pattern,
                mark
            )?;
        }
        Ok(())
    }
}
