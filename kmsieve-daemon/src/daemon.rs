//! Daemon lifecycle.
//!
//! Startup order:
//! 1. Load `kmsieve.toml`, apply env and CLI overrides, validate
//! 2. Initialize logging (stderr)
//! 3. Take the instance lock (contention means a clean exit)
//! 4. Install signal handlers
//! 5. Load rules, open checkpoint, dump file and device, build the pipeline
//! 6. Report readiness, run the event loop, report stopping
//!
//! The lock is released on every path once it has been acquired.

use std::future::Future;
use std::io::Write;

use kmsieve_core::config::KmsieveConfig;
use kmsieve_pipeline::rule::IieEngine;
use kmsieve_pipeline::{CheckpointStore, KmsgPipelineBuilder, PipelineConfig, RuleLoader};

use crate::cli::DaemonCli;
use crate::device::KmsgDevice;
use crate::error::DaemonError;
use crate::event_loop::{LoopOutcome, ShutdownSignals, StopReason, run_event_loop};
use crate::lock::{InstanceLock, LockOutcome};
use crate::{logging, metrics_server, notify};

/// Load the effective configuration: file (or defaults), env, then CLI flags.
pub async fn load_config(cli: &DaemonCli) -> Result<KmsieveConfig, DaemonError> {
    let (path, required) = cli.config_source();
    let mut config = KmsieveConfig::load_or_default(path, required).await?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Run the daemon until shutdown.
///
/// Returns `Ok(())` on a signal, end of stream or lock contention.
pub async fn run(cli: DaemonCli) -> Result<(), DaemonError> {
    let config = load_config(&cli).await?;
    logging::init_tracing(&config.general)?;

    if cli.validate {
        return validate(&config).await;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = %config.filter.mode,
        device = %config.source.device,
        "kmsieved starting"
    );

    let lock = match InstanceLock::acquire(&config.general.lock_dir).map_err(|source| {
        DaemonError::Open {
            what: "lock directory",
            path: config.general.lock_dir.clone(),
            source,
        }
    })? {
        LockOutcome::Acquired(lock) => lock,
        LockOutcome::Held { pid } => {
            tracing::info!(
                lock_dir = %config.general.lock_dir,
                pid = ?pid,
                "another instance is running, exiting"
            );
            return Ok(());
        }
    };

    let mut signals = ShutdownSignals::install().map_err(|source| DaemonError::Open {
        what: "signal handler",
        path: "SIGTERM/SIGINT".to_owned(),
        source,
    })?;

    let stdout = std::io::stdout().lock();
    let result = serve(&config, stdout, signals.recv()).await;

    if let Err(e) = lock.release() {
        tracing::warn!(error = %e, "failed to release instance lock");
    }

    let outcome = result?;
    match outcome.reason {
        StopReason::Signal(signal) => tracing::info!(signal, "kmsieved stopped"),
        StopReason::EndOfStream => tracing::info!("kmsieved stopped at end of stream"),
    }
    Ok(())
}

/// Build the pipeline from `config` and run the event loop.
///
/// `keep` receives forwarded lines (stdout in production). Signal handlers
/// behind `shutdown` must already be installed.
pub async fn serve<K, S>(
    config: &KmsieveConfig,
    keep: K,
    shutdown: S,
) -> Result<LoopOutcome, DaemonError>
where
    K: Write,
    S: Future<Output = &'static str>,
{
    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }

    let pipeline_config = PipelineConfig::from_core(config).map_err(DaemonError::Startup)?;

    let engine = RuleLoader::load_file(&pipeline_config.rules_path)
        .await
        .map_err(DaemonError::Rules)?;
    let rule_count = engine.as_ref().map_or(0, IieEngine::len);
    metrics_server::record_daemon_metrics(rule_count, pipeline_config.mode);

    let checkpoint =
        CheckpointStore::open(&pipeline_config.checkpoint_path).map_err(DaemonError::Checkpoint)?;

    let dump = match pipeline_config.open_dump().map_err(DaemonError::Startup)? {
        Some((path, file)) => {
            tracing::info!(path = %path.display(), "archiving excluded messages");
            Some(file)
        }
        None => None,
    };

    let device =
        KmsgDevice::open(&config.source.device).map_err(|source| DaemonError::Open {
            what: "kmsg device",
            path: config.source.device.clone(),
            source,
        })?;

    let mut pipeline = KmsgPipelineBuilder::new()
        .config(pipeline_config)
        .engine(engine)
        .checkpoint(checkpoint)
        .keep_sink(keep)
        .dump_sink(dump)
        .build()
        .map_err(DaemonError::Startup)?;

    notify::notify_ready(&config.general.ready_command).await;
    tracing::info!(
        rules = rule_count,
        checkpoint = pipeline.stats().checkpoint,
        "kmsieved ready"
    );

    let outcome = run_event_loop(
        &device,
        &mut pipeline,
        config.source.read_buffer_size,
        shutdown,
    )
    .await;
    notify::notify_stopping();
    outcome
}

/// `--validate`: check the rule file on top of the already validated config.
async fn validate(config: &KmsieveConfig) -> Result<(), DaemonError> {
    let pipeline_config = PipelineConfig::from_core(config).map_err(DaemonError::Startup)?;
    let engine = RuleLoader::load_file(&pipeline_config.rules_path)
        .await
        .map_err(DaemonError::Rules)?;

    tracing::info!(
        rules_path = %pipeline_config.rules_path.display(),
        rules = engine.as_ref().map_or(0, IieEngine::len),
        "configuration is valid"
    );
    Ok(())
}
