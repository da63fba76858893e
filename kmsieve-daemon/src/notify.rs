//! Readiness notification.
//!
//! Two independent, best-effort channels:
//! - the service manager's `$NOTIFY_SOCKET` datagram socket (`READY=1`, `STOPPING=1`)
//! - an operator-supplied `ready_command`, run once through `sh -c`
//!
//! Failures are logged and never stop the daemon.

use std::io;
use std::os::fd::AsFd;
use std::os::unix::net::{SocketAddr, UnixDatagram};
use std::process::Stdio;

use tokio::process::Command;

/// Environment variable naming the service manager socket.
pub const NOTIFY_SOCKET_ENV: &str = "NOTIFY_SOCKET";

/// Send `state` to `$NOTIFY_SOCKET`.
///
/// Returns `Ok(false)` when the variable is unset or empty.
/// A leading `@` selects the abstract socket namespace.
pub fn notify(state: &str) -> io::Result<bool> {
    let Some(target) = std::env::var_os(NOTIFY_SOCKET_ENV).filter(|v| !v.is_empty()) else {
        return Ok(false);
    };
    let target = target.to_string_lossy().into_owned();
    let addr = socket_addr(&target)?;

    let socket = UnixDatagram::unbound()?;
    socket.send_to_addr(state.as_bytes(), &addr)?;
    Ok(true)
}

fn socket_addr(target: &str) -> io::Result<SocketAddr> {
    if let Some(name) = target.strip_prefix('@') {
        #[cfg(target_os = "linux")]
        {
            use std::os::linux::net::SocketAddrExt;
            return SocketAddr::from_abstract_name(name.as_bytes());
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = name;
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "abstract notify sockets are linux-only",
            ));
        }
    }
    SocketAddr::from_pathname(target)
}

/// Run the configured ready command via `sh -c`.
///
/// The child's stdout is redirected to our stderr so it cannot mix with
/// forwarded kernel lines. Returns the exit status.
pub async fn run_ready_command(command: &str) -> io::Result<std::process::ExitStatus> {
    let stderr = io::stderr().as_fd().try_clone_to_owned()?;
    Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stderr))
        .status()
        .await
}

/// Signal readiness on every configured channel.
pub async fn notify_ready(ready_command: &str) {
    match notify("READY=1") {
        Ok(true) => tracing::debug!("readiness sent to service manager"),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "failed to notify service manager"),
    }

    if ready_command.trim().is_empty() {
        return;
    }
    match run_ready_command(ready_command).await {
        Ok(status) if status.success() => {
            tracing::debug!(command = ready_command, "ready command finished");
        }
        Ok(status) => {
            tracing::warn!(command = ready_command, %status, "ready command failed");
        }
        Err(e) => {
            tracing::warn!(command = ready_command, error = %e, "failed to run ready command");
        }
    }
}

/// Tell the service manager that shutdown has begun.
pub fn notify_stopping() {
    if let Err(e) = notify("STOPPING=1") {
        tracing::warn!(error = %e, "failed to notify service manager");
    }
}
