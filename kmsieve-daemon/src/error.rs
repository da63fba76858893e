//! Daemon error types and exit code mapping

use kmsieve_core::error::KmsieveError;
use kmsieve_pipeline::PipelineError;

/// Daemon error type.
///
/// Startup failures map to exit code 1, failures inside the running event
/// loop to exit code 2. Lock contention is not an error.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Configuration loading or validation failure.
    #[error("{0}")]
    Config(#[from] KmsieveError),

    /// Malformed rule file or invalid regex.
    #[error("{0}")]
    Rules(PipelineError),

    /// Dump file or pipeline assembly failed at startup.
    #[error("startup failed: {0}")]
    Startup(PipelineError),

    /// Checkpoint could not be opened or its baseline written.
    #[error("{0}")]
    Checkpoint(PipelineError),

    /// A startup resource (device, lock directory, signal handler) could not be set up.
    #[error("failed to open {what} {path}: {source}")]
    Open {
        what: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// One-shot setup helper failed (logging, metrics recorder).
    #[error("{0}")]
    Setup(String),

    /// Reading the kernel log device failed while running.
    #[error("read from {path} failed: {source}")]
    Device {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Pipeline failed while running (sink write, checkpoint persistence).
    #[error("{0}")]
    Run(PipelineError),
}

impl DaemonError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                      |
    /// |------|----------------------------------------------|
    /// | 0    | Normal shutdown or another instance running  |
    /// | 1    | Configuration, rule or startup error         |
    /// | 2    | Checkpoint persistence or run-loop I/O error |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_)
            | Self::Rules(_)
            | Self::Startup(_)
            | Self::Open { .. }
            | Self::Setup(_) => 1,
            Self::Checkpoint(_) | Self::Device { .. } | Self::Run(_) => 2,
        }
    }
}

impl From<anyhow::Error> for DaemonError {
    fn from(e: anyhow::Error) -> Self {
        Self::Setup(format!("{e:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kmsieve_core::error::ConfigError;

    fn io_err() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied")
    }

    #[test]
    fn test_exit_code_config_error() {
        let err = DaemonError::Config(KmsieveError::Config(ConfigError::ParseFailed {
            reason: "bad toml".to_owned(),
        }));
        assert_eq!(err.exit_code(), 1, "config error should return exit code 1");
    }

    #[test]
    fn test_exit_code_rule_error() {
        let err = DaemonError::Rules(PipelineError::RuleLoad {
            path: "/etc/kmsieve/rules".to_owned(),
            reason: "too large".to_owned(),
        });
        assert_eq!(err.exit_code(), 1, "rule error should return exit code 1");
    }

    #[test]
    fn test_exit_code_startup_errors() {
        let err = DaemonError::Startup(PipelineError::Config {
            field: "dump.marker".to_owned(),
            reason: "must be a single character".to_owned(),
        });
        assert_eq!(err.exit_code(), 1);

        let err = DaemonError::Open {
            what: "kmsg device",
            path: "/dev/kmsg".to_owned(),
            source: io_err(),
        };
        assert_eq!(err.exit_code(), 1);

        let err: DaemonError = anyhow::anyhow!("recorder already installed").into();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_checkpoint_persistence_error() {
        let err = DaemonError::Checkpoint(PipelineError::Checkpoint {
            path: "/run/kmsieve/checkpoint".to_owned(),
            source: io_err(),
        });
        assert_eq!(err.exit_code(), 2, "checkpoint error should return exit code 2");
    }

    #[test]
    fn test_exit_code_run_loop_errors() {
        let err = DaemonError::Device {
            path: "/dev/kmsg".to_owned(),
            source: io_err(),
        };
        assert_eq!(err.exit_code(), 2, "device error should return exit code 2");

        let err = DaemonError::Run(PipelineError::Checkpoint {
            path: "/run/kmsieve/checkpoint".to_owned(),
            source: io_err(),
        });
        assert_eq!(err.exit_code(), 2, "checkpoint failure should return exit code 2");
    }

    #[test]
    fn test_error_display_open() {
        let err = DaemonError::Open {
            what: "kmsg device",
            path: "/dev/kmsg".to_owned(),
            source: io_err(),
        };
        let display_str = err.to_string();
        assert!(display_str.contains("kmsg device"));
        assert!(display_str.contains("/dev/kmsg"));
    }

    #[test]
    fn test_from_anyhow_keeps_context_chain() {
        let err: DaemonError = anyhow::anyhow!("inner")
            .context("failed to initialize tracing")
            .into();
        let display_str = err.to_string();
        assert!(display_str.contains("failed to initialize tracing"));
        assert!(display_str.contains("inner"));
    }
}
