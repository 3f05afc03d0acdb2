//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{FanoutBlueprint, OutputType};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    device_count: usize,
    consumer_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    device_count: blueprint.driver.device_count(),
                    consumer_count: blueprint.consumers.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &FanoutBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let device_count = blueprint.driver.device_count();

    if device_count == 0 {
        warnings.push("No devices configured - every consumer stays detached".to_string());
    }
    if blueprint.consumers.is_empty() {
        warnings.push("No consumers configured - no device will be opened".to_string());
    }

    for consumer in &blueprint.consumers {
        if consumer.device_index <= 0 {
            warnings.push(format!(
                "Consumer '{}' has device_index {} and starts detached",
                consumer.name, consumer.device_index
            ));
        } else if device_count > 0 && consumer.device_index as usize > device_count {
            warnings.push(format!(
                "Consumer '{}' device_index {} is clamped to {}",
                consumer.name, consumer.device_index, device_count
            ));
        }
    }

    let mut paths = HashSet::new();
    for consumer in &blueprint.consumers {
        if matches!(consumer.output.output_type, OutputType::File | OutputType::List) {
            if let Some(path) = consumer.output.params.get("path") {
                if !paths.insert(path.as_str()) {
                    warnings.push(format!(
                        "Consumer '{}' writes to '{}', shared with another consumer",
                        consumer.name, path
                    ));
                }
            }
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Devices: {}", summary.device_count);
            println!("  Consumers: {}", summary.consumer_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::{ConfigFormat, ConfigLoader};
    use std::io::Write;

    const CONFIG: &str = r#"
[driver]
kind = "mock"

[[driver.devices]]
id = "pad-0"

[[consumers]]
name = "viz"
device_index = 4
[consumers.output]
output_type = "log"

[[consumers]]
name = "idle"
device_index = 0
[consumers.output]
output_type = "log"
"#;

    #[test]
    fn test_collect_warnings() {
        let blueprint = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        let warnings = collect_warnings(&blueprint);

        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("clamped to 1"));
        assert!(warnings[1].contains("starts detached"));
    }

    #[test]
    fn test_validate_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        let result = validate_config(&args);
        assert!(result.valid);
        assert_eq!(result.summary.unwrap().consumer_count, 2);
    }

    #[test]
    fn test_missing_file_is_invalid() {
        let args = ValidateArgs {
            config: "/no/such/touchfan.toml".into(),
            json: false,
        };
        assert!(!validate_config(&args).valid);
        assert!(run_validate(&args).is_err());
    }
}
