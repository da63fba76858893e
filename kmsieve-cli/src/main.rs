use std::process::ExitCode;

use clap::Parser;

use kmsieve_cli::cli::{Cli, Commands};
use kmsieve_cli::commands;
use kmsieve_cli::output::OutputWriter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    let source = cli.config_source();
    let writer = OutputWriter::new(cli.output);

    let result = match cli.command {
        Commands::Rules(args) => commands::rules::execute(args, &source, &writer).await,
        Commands::Checkpoint(args) => commands::checkpoint::execute(args, &source, &writer).await,
        Commands::Config(args) => commands::config::execute(args, &source, &writer).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
