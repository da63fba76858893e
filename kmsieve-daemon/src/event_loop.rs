//! Single-threaded event loop.
//!
//! Waits on exactly two sources: the shutdown future (fed by the signal
//! handlers) and read readiness of the kernel log device. A readable device
//! is drained until the read would block, each chunk going straight through
//! the synchronous pipeline. Shutdown is checked first on every wake-up.

use std::future::Future;
use std::io::Write;

use metrics::counter;

use kmsieve_core::metrics as m;
use kmsieve_pipeline::{KmsgPipeline, PipelineStats};

use crate::device::{KmsgDevice, ReadOutcome};
use crate::error::DaemonError;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A termination signal was received (signal name).
    Signal(&'static str),
    /// The device reported end of stream.
    EndOfStream,
}

/// Final state after a clean stop.
#[derive(Debug, Clone, Copy)]
pub struct LoopOutcome {
    pub reason: StopReason,
    pub stats: PipelineStats,
}

/// Drive `pipeline` from `device` until `shutdown` resolves or the stream ends.
///
/// Both stop paths flush the pipeline with `finish()` before returning.
///
/// # Errors
///
/// - [`DaemonError::Device`] when a read fails with anything but `EINTR`/`EPIPE`
/// - [`DaemonError::Run`] when a sink write or checkpoint update fails
pub async fn run_event_loop<K, D, S>(
    device: &KmsgDevice,
    pipeline: &mut KmsgPipeline<K, D>,
    buffer_size: usize,
    shutdown: S,
) -> Result<LoopOutcome, DaemonError>
where
    K: Write,
    D: Write,
    S: Future<Output = &'static str>,
{
    let mut buf = vec![0u8; buffer_size];
    tokio::pin!(shutdown);

    let reason = loop {
        let mut guard = tokio::select! {
            biased;
            signal = &mut shutdown => {
                tracing::info!(signal, "shutdown signal received");
                break StopReason::Signal(signal);
            }
            ready = device.readable() => ready.map_err(|e| device_error(device, e))?,
        };

        let ended = loop {
            match guard.read(&mut buf).map_err(|e| device_error(device, e))? {
                ReadOutcome::Data(n) => pipeline.push(&buf[..n]).map_err(DaemonError::Run)?,
                ReadOutcome::Overrun => {
                    counter!(m::KMSG_OVERRUNS_TOTAL).increment(1);
                    tracing::warn!(
                        device = %device.path().display(),
                        "kernel ring buffer overwrote unread records"
                    );
                }
                ReadOutcome::WouldBlock => break false,
                ReadOutcome::EndOfStream => break true,
            }
        };

        if ended {
            tracing::info!(device = %device.path().display(), "kernel log stream ended");
            break StopReason::EndOfStream;
        }
    };

    let stats = pipeline.finish().map_err(DaemonError::Run)?;
    Ok(LoopOutcome { reason, stats })
}

fn device_error(device: &KmsgDevice, source: std::io::Error) -> DaemonError {
    DaemonError::Device {
        path: device.path().display().to_string(),
        source,
    }
}

/// Resolve when SIGTERM or SIGINT arrives.
///
/// The handlers must be installed before readiness is reported so that an
/// early signal is not lost.
pub struct ShutdownSignals {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    /// Install the SIGTERM and SIGINT handlers.
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for the next termination signal and return its name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}
