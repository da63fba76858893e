//! kmsieve daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `kmsieved` is used as a binary (main.rs).

pub mod cli;
pub mod daemon;
pub mod device;
pub mod error;
pub mod event_loop;
pub mod lock;
pub mod logging;
pub mod metrics_server;
pub mod notify;

pub use daemon::run;
pub use error::DaemonError;
