//! CLI handler for listing input devices.

use crate::audio::LocalMicrophone;
use anyhow::Result;

use super::args::DevicesCliArgs;

pub fn handle_devices_command(args: DevicesCliArgs) -> Result<()> {
    let devices = LocalMicrophone::new().list_input_devices()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No input devices found.");
        return Ok(());
    }

    println!("=== Input Devices ===\n");
    for device in &devices {
        let marker = if device.is_default { "*" } else { " " };
        println!("{} {}", marker, device.name);
    }
    println!("\n* system default");

    Ok(())
}
