//! Interactive selection of the default input device and sensitivity.

use crate::audio::LocalMicrophone;
use crate::config::Config;
use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use std::io::{self, IsTerminal};
use tracing::info;

const SYSTEM_DEFAULT: &str = "System default";

pub fn handle_configure_command() -> Result<()> {
    if !io::stdin().is_terminal() {
        info!("Non-interactive session. Edit the config file or pass --device/--sensitivity instead.");
        return Ok(());
    }

    let theme = ColorfulTheme::default();
    let mut config = Config::load()?;

    let devices = LocalMicrophone::new().list_input_devices()?;
    let mut items = vec![SYSTEM_DEFAULT.to_string()];
    items.extend(devices.iter().map(|device| device.name.clone()));

    let current = device_index(&items, config.microphone.device.as_deref());
    let selection = Select::with_theme(&theme)
        .with_prompt("Select an input device")
        .items(&items)
        .default(current)
        .interact()?;

    let sensitivity: u8 = Input::with_theme(&theme)
        .with_prompt("Sensitivity (0-100)")
        .default(config.microphone.sensitivity)
        .validate_with(|value: &u8| {
            if *value <= 100 {
                Ok(())
            } else {
                Err("Sensitivity must be between 0 and 100")
            }
        })
        .interact_text()?;

    config.microphone.device = selected_device(&items, selection);
    config.microphone.sensitivity = sensitivity;
    config.save()?;

    println!();
    println!(
        "Saved: device = {}, sensitivity = {}",
        config.microphone.device.as_deref().unwrap_or(SYSTEM_DEFAULT),
        config.microphone.sensitivity
    );

    Ok(())
}

fn device_index(items: &[String], configured: Option<&str>) -> usize {
    configured
        .and_then(|name| items.iter().skip(1).position(|item| item == name))
        .map(|position| position + 1)
        .unwrap_or(0)
}

fn selected_device(items: &[String], selection: usize) -> Option<String> {
    if selection == 0 {
        None
    } else {
        items.get(selection).cloned()
    }
}
