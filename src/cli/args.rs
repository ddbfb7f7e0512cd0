use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mictest")]
#[command(about = "Record a short clip, watch the input level, play it back", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run a microphone test (default when no subcommand is given)
    Run(RunCliArgs),
    /// List available input devices
    Devices(DevicesCliArgs),
    /// Choose the default input device and sensitivity interactively
    Configure,
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug, Default)]
pub struct RunCliArgs {
    /// Input device name (overrides the configured device)
    #[arg(short, long)]
    pub device: Option<String>,
    /// Level meter sensitivity, 0-100 (50 = unscaled)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub sensitivity: Option<u8>,
    /// Seconds to record before stopping
    #[arg(long)]
    pub duration: Option<u64>,
    /// Do not play the recording back
    #[arg(long)]
    pub no_playback: bool,
    /// Also write the recording to this WAV file
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct DevicesCliArgs {
    /// Print the device list as JSON
    #[arg(long)]
    pub json: bool,
}
