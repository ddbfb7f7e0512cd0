pub mod args;
pub mod configure;
pub mod devices;

pub use args::{Cli, CliCommand, DevicesCliArgs, RunCliArgs};
pub use configure::handle_configure_command;
pub use devices::handle_devices_command;
