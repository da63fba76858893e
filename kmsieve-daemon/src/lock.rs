//! Single-instance lock.
//!
//! The lock is a directory created with an atomic `mkdir(2)`: whoever
//! creates it owns it and records its PID in `<lock_dir>/pid`. A lock whose
//! recorded PID no longer exists is stale and is reclaimed once.
//!
//! # Security
//!
//! - Directory created with mode 0o700, PID file with 0o600
//! - PID file created with `create_new(true)` inside the directory we own

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

pub use kmsieve_core::process::{PID_FILE_NAME, holder_pid};
use kmsieve_core::process::is_process_alive;

/// Result of [`InstanceLock::acquire`].
#[derive(Debug)]
pub enum LockOutcome {
    /// This process now owns the lock.
    Acquired(InstanceLock),
    /// Another live instance owns the lock. `pid` is `None` when the
    /// holder has not written (or we cannot read) its PID file.
    Held { pid: Option<u32> },
}

/// Held instance lock. Released on drop.
#[derive(Debug)]
pub struct InstanceLock {
    dir: PathBuf,
    released: bool,
}

impl InstanceLock {
    /// Try to take the lock at `dir`.
    ///
    /// The parent of `dir` is created if missing.
    ///
    /// # Errors
    ///
    /// Any I/O failure other than "already exists", including a stale lock
    /// directory that cannot be removed.
    pub fn acquire(dir: impl AsRef<Path>) -> io::Result<LockOutcome> {
        let dir = dir.as_ref();
        if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::DirBuilder::new()
                .mode(0o755)
                .recursive(true)
                .create(parent)?;
        }

        let mut reclaimed = false;
        loop {
            match fs::DirBuilder::new().mode(0o700).create(dir) {
                Ok(()) => {
                    let lock = Self {
                        dir: dir.to_path_buf(),
                        released: false,
                    };
                    lock.write_pid()?;
                    tracing::debug!(lock_dir = %dir.display(), "instance lock acquired");
                    return Ok(LockOutcome::Acquired(lock));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let pid = holder_pid(dir);
                    let stale = pid.is_some_and(|pid| !is_process_alive(pid));
                    if !stale || reclaimed {
                        return Ok(LockOutcome::Held { pid });
                    }

                    tracing::warn!(
                        lock_dir = %dir.display(),
                        pid = ?pid,
                        "reclaiming stale instance lock"
                    );
                    remove_lock_dir(dir)?;
                    reclaimed = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Lock directory path.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Release explicitly, reporting failures.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        remove_lock_dir(&self.dir)
    }

    fn write_pid(&self) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(self.dir.join(PID_FILE_NAME))?;
        writeln!(file, "{}", std::process::id())
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_lock_dir(&self.dir) {
            tracing::warn!(lock_dir = %self.dir.display(), error = %e, "failed to release instance lock");
        }
    }
}

fn remove_lock_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_file(dir.join(PID_FILE_NAME)) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    match fs::remove_dir(dir) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
