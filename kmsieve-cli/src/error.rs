//! CLI-specific error types and exit code mapping

use kmsieve_core::error::KmsieveError;
use kmsieve_pipeline::PipelineError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The daemon holds the instance lock.
    #[error("kmsieved is running (lock {lock_dir}, pid {pid}); stop it or pass --force")]
    DaemonRunning { lock_dir: String, pid: String },

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from kmsieve-core.
    #[error("{0}")]
    Core(#[from] KmsieveError),

    /// Rule file could not be loaded or parsed.
    #[error("rule error: {0}")]
    Rule(String),

    /// Checkpoint read or write failure.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                              |
    /// |------|--------------------------------------|
    /// | 0    | Success                              |
    /// | 1    | General / command / rule error       |
    /// | 2    | Configuration error                  |
    /// | 3    | Daemon running (lock held)           |
    /// | 10   | IO error                             |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Core(KmsieveError::Config(_)) => 2,
            Self::DaemonRunning { .. } => 3,
            Self::Io(_) => 10,
            Self::JsonSerialize(_)
            | Self::Command(_)
            | Self::Core(_)
            | Self::Rule(_)
            | Self::Checkpoint(_) => 1,
        }
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        if e.is_rule_error() {
            Self::Rule(e.to_string())
        } else {
            Self::Checkpoint(e.to_string())
        }
    }
}
