//! `devices` command implementation.

use anyhow::{Context, Result};
use contracts::{DeviceEnumerator, DeviceId, FanoutBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::DevicesArgs;

/// Device listing for JSON output
#[derive(Serialize)]
struct DeviceListing {
    devices: Vec<DeviceInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    consumers: Vec<ConsumerInfo>,
}

#[derive(Serialize)]
struct DeviceInfo {
    index: usize,
    id: String,
}

#[derive(Serialize)]
struct ConsumerInfo {
    name: String,
    device_index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<String>,
}

/// Execute the `devices` command
pub fn run_devices(args: &DevicesArgs) -> Result<()> {
    info!(config = %args.config.display(), "Enumerating devices");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let driver = devices::build_driver(&blueprint.driver);
    let listing = build_listing(&blueprint, &driver.list_devices());

    if args.json {
        let json =
            serde_json::to_string_pretty(&listing).context("Failed to serialize device list")?;
        println!("{}", json);
    } else {
        print_listing(&listing);
    }

    Ok(())
}

/// Device a 1-based selection index resolves to (clamped, `<= 0` = none)
fn resolve(devices: &[DeviceId], index: i64) -> Option<&DeviceId> {
    if index <= 0 {
        return None;
    }
    let last = devices.len().checked_sub(1)?;
    let position = usize::try_from(index - 1).unwrap_or(usize::MAX).min(last);
    devices.get(position)
}

fn build_listing(blueprint: &FanoutBlueprint, devices: &[DeviceId]) -> DeviceListing {
    DeviceListing {
        devices: devices
            .iter()
            .enumerate()
            .map(|(i, id)| DeviceInfo {
                index: i + 1,
                id: id.to_string(),
            })
            .collect(),
        consumers: blueprint
            .consumers
            .iter()
            .map(|c| ConsumerInfo {
                name: c.name.clone(),
                device_index: c.device_index,
                device: resolve(devices, c.device_index).map(|d| d.to_string()),
            })
            .collect(),
    }
}

fn print_listing(listing: &DeviceListing) {
    println!("Devices ({})", listing.devices.len());
    for (i, device) in listing.devices.iter().enumerate() {
        let prefix = if i + 1 == listing.devices.len() {
            "└─"
        } else {
            "├─"
        };
        println!("   {} {}. {}", prefix, device.index, device.id);
    }

    if !listing.consumers.is_empty() {
        println!("\nConsumers ({})", listing.consumers.len());
        for (i, consumer) in listing.consumers.iter().enumerate() {
            let prefix = if i + 1 == listing.consumers.len() {
                "└─"
            } else {
                "├─"
            };
            println!(
                "   {} {} (index {}) -> {}",
                prefix,
                consumer.name,
                consumer.device_index,
                consumer.device.as_deref().unwrap_or("detached")
            );
        }
    }
    println!();
}
