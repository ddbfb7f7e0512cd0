#![allow(clippy::arc_with_non_send_sync)]

use anyhow::Result;
use clap::Parser;
use mictest::{
    app,
    cli::{handle_configure_command, handle_devices_command, Cli, CliCommand, RunCliArgs},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("mictest {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Devices(args)) => handle_devices_command(args),
        Some(CliCommand::Configure) => handle_configure_command(),
        Some(CliCommand::Run(args)) => app::run_test(args).await,
        None => app::run_test(RunCliArgs::default()).await,
    }
}
