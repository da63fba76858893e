//! `kmsieve checkpoint` command handler

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use kmsieve_core::process::{PID_FILE_NAME, is_process_alive};
use kmsieve_pipeline::CheckpointStore;

use crate::cli::{CheckpointAction, CheckpointArgs, ConfigSource};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `checkpoint` command.
pub async fn execute(
    args: CheckpointArgs,
    config: &ConfigSource,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let loaded = config.load().await?;
    let lock_dir = PathBuf::from(&loaded.general.lock_dir);

    let report = match args.action {
        CheckpointAction::Show { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(&loaded.checkpoint.path));
            show(&path, &lock_dir)?
        }
        CheckpointAction::Set { value, path, force } => {
            let path = path.unwrap_or_else(|| PathBuf::from(&loaded.checkpoint.path));
            set(&path, value, &lock_dir, force)?
        }
    };

    writer.render(&report)
}

/// Read the checkpoint without touching it.
pub fn show(path: &Path, lock_dir: &Path) -> Result<CheckpointReport, CliError> {
    let value = CheckpointStore::read(path)?;
    Ok(CheckpointReport {
        path: path.display().to_string(),
        exists: path.exists(),
        value,
        previous: None,
        daemon: lock_state(lock_dir),
    })
}

/// Overwrite the checkpoint.
///
/// Refuses while a live daemon holds `lock_dir` unless `force` is set: the
/// daemon would overwrite the value on its next record anyway.
pub fn set(
    path: &Path,
    value: u64,
    lock_dir: &Path,
    force: bool,
) -> Result<CheckpointReport, CliError> {
    let daemon = lock_state(lock_dir);
    match daemon {
        LockState::Held { pid } if !force => {
            return Err(CliError::DaemonRunning {
                lock_dir: lock_dir.display().to_string(),
                pid: pid.map_or_else(|| "unknown".to_owned(), |p| p.to_string()),
            });
        }
        LockState::Held { .. } => {
            warn!(lock_dir = %lock_dir.display(), "overwriting checkpoint while daemon runs");
        }
        LockState::Free | LockState::Stale { .. } => {}
    }

    let previous = CheckpointStore::read(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    CheckpointStore::overwrite(path, value)?;
    info!(path = %path.display(), previous, value, "checkpoint overwritten");

    Ok(CheckpointReport {
        path: path.display().to_string(),
        exists: true,
        value,
        previous: Some(previous),
        daemon,
    })
}

/// Daemon instance lock state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LockState {
    /// No lock directory.
    Free,
    /// Lock held by a live (or unidentifiable) process.
    Held { pid: Option<u32> },
    /// Lock left behind by a process that no longer exists.
    Stale { pid: u32 },
}

/// Inspect the lock directory the daemon uses.
pub fn lock_state(lock_dir: &Path) -> LockState {
    if !lock_dir.exists() {
        debug!(lock_dir = %lock_dir.display(), "lock directory does not exist");
        return LockState::Free;
    }

    let pid_file = lock_dir.join(PID_FILE_NAME);
    let pid = match std::fs::read_to_string(&pid_file) {
        Ok(content) => content.trim().parse::<u32>().ok(),
        Err(e) => {
            warn!(pid_file = %pid_file.display(), error = %e, "failed to read pid file");
            None
        }
    };

    match pid {
        Some(pid) if !is_process_alive(pid) => LockState::Stale { pid },
        pid => LockState::Held { pid },
    }
}

#[derive(Debug, Serialize)]
pub struct CheckpointReport {
    pub path: String,
    pub exists: bool,
    /// Next sequence number the daemon will forward.
    pub value: u64,
    /// Value before `set`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<u64>,
    pub daemon: LockState,
}

impl Render for CheckpointReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Checkpoint: {}", self.path.bold())?;
        match self.previous {
            Some(previous) => writeln!(
                w,
                "  Value: {} -> {}",
                previous,
                self.value.to_string().green().bold()
            )?,
            None if self.exists => writeln!(w, "  Value: {}", self.value.to_string().bold())?,
            None => writeln!(w, "  Value: {} (no file, starts from 0)", self.value)?,
        }

        let daemon = match self.daemon {
            LockState::Free => "not running".normal(),
            LockState::Held { pid: Some(pid) } => format!("running (pid {pid})").yellow(),
            LockState::Held { pid: None } => "running (pid unknown)".yellow(),
            LockState::Stale { pid } => format!("stale lock (pid {pid})").red(),
        };
        writeln!(w, "  Daemon: {}", daemon)?;
        Ok(())
    }
}
