use std::process::ExitCode;

use clap::Parser;

use kmsieve_daemon::cli::DaemonCli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = DaemonCli::parse();

    match kmsieve_daemon::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // config errors happen before the subscriber exists
            if tracing::dispatcher::has_been_set() {
                tracing::error!(error = %e, exit_code = e.exit_code(), "kmsieved failed");
            } else {
                eprintln!("kmsieved: {e}");
            }
            ExitCode::from(e.exit_code())
        }
    }
}
