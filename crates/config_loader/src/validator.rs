//! Configuration validation
//!
//! Rules:
//! - device ids unique
//! - consumer names unique and non-empty
//! - frequency_hz finite and > 0 with a representable sampling interval,
//!   contacts <= MAX_CONTACTS
//! - replay speed finite and > 0
//! - drop_oldest capacity > 0
//! - required output params present

use std::collections::HashSet;
use std::time::Duration;

use contracts::{
    ConsumerConfig, ContractError, DriverConfig, FanoutBlueprint, OutputType, QueuePolicy,
};

/// Upper bound on simulated fingers per frame
pub const MAX_CONTACTS: u32 = 32;

/// Validate a FanoutBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &FanoutBlueprint) -> Result<(), ContractError> {
    validate_driver(&blueprint.driver)?;
    validate_consumer_names(blueprint)?;
    for consumer in &blueprint.consumers {
        validate_queue_policy(consumer)?;
        validate_output(consumer)?;
    }
    Ok(())
}

fn validate_driver(driver: &DriverConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for id in driver.device_ids() {
        if !seen.insert(id) {
            return Err(ContractError::config_validation(
                format!("driver.devices[id={id}]"),
                "duplicate device id",
            ));
        }
    }

    match driver {
        DriverConfig::Mock { devices } => {
            for device in devices {
                if !valid_frequency(device.frequency_hz) {
                    return Err(ContractError::config_validation(
                        format!("driver.devices[{}].frequency_hz", device.id),
                        format!(
                            "frequency_hz must be a finite rate > 0, got {}",
                            device.frequency_hz
                        ),
                    ));
                }
                if device.contacts > MAX_CONTACTS {
                    return Err(ContractError::config_validation(
                        format!("driver.devices[{}].contacts", device.id),
                        format!(
                            "contacts must be <= {MAX_CONTACTS}, got {}",
                            device.contacts
                        ),
                    ));
                }
            }
        }
        DriverConfig::Replay { speed, .. } => {
            if !is_positive_finite(*speed) {
                return Err(ContractError::config_validation(
                    "driver.speed",
                    format!("speed must be finite and > 0, got {speed}"),
                ));
            }
        }
    }
    Ok(())
}

/// `true` for finite values strictly above zero (rejects NaN)
pub fn is_positive_finite(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn valid_frequency(hz: f64) -> bool {
    is_positive_finite(hz) && Duration::try_from_secs_f64(1.0 / hz).is_ok()
}

fn validate_consumer_names(blueprint: &FanoutBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, consumer) in blueprint.consumers.iter().enumerate() {
        if consumer.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("consumers[{idx}].name"),
                "consumer name cannot be empty",
            ));
        }
        if !seen.insert(consumer.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("consumers[name={}]", consumer.name),
                "duplicate consumer name",
            ));
        }
    }
    Ok(())
}

fn validate_queue_policy(consumer: &ConsumerConfig) -> Result<(), ContractError> {
    if let QueuePolicy::DropOldest { capacity: 0 } = consumer.queue {
        return Err(ContractError::config_validation(
            format!("consumers[{}].queue.capacity", consumer.name),
            "drop_oldest capacity must be > 0",
        ));
    }
    Ok(())
}

fn validate_output(consumer: &ConsumerConfig) -> Result<(), ContractError> {
    let required = match consumer.output.output_type {
        OutputType::File => Some("path"),
        OutputType::Network => Some("addr"),
        OutputType::Log | OutputType::List => None,
    };

    if let Some(key) = required {
        if !consumer.output.params.contains_key(key) {
            return Err(ContractError::config_validation(
                format!("consumers[{}].output.params.{key}", consumer.name),
                format!(
                    "{:?} output requires '{key}'",
                    consumer.output.output_type
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ConfigVersion, MockDeviceConfig, OutputConfig};
    use std::collections::HashMap;

    fn device(id: &str) -> MockDeviceConfig {
        MockDeviceConfig {
            id: id.to_string(),
            frequency_hz: 60.0,
            contacts: 2,
        }
    }

    fn consumer(name: &str, output_type: OutputType) -> ConsumerConfig {
        ConsumerConfig {
            name: name.to_string(),
            device_index: 1,
            queue: QueuePolicy::Unbounded,
            output: OutputConfig {
                output_type,
                params: HashMap::new(),
            },
        }
    }

    fn blueprint() -> FanoutBlueprint {
        FanoutBlueprint {
            version: ConfigVersion::V1,
            driver: DriverConfig::Mock {
                devices: vec![device("pad-0"), device("pad-1")],
            },
            consumers: vec![consumer("a", OutputType::Log), consumer("b", OutputType::List)],
        }
    }

    #[test]
    fn test_valid_blueprint() {
        assert!(validate(&blueprint()).is_ok());
    }

    #[test]
    fn test_duplicate_device_id() {
        let mut bp = blueprint();
        bp.driver = DriverConfig::Mock {
            devices: vec![device("pad"), device("pad")],
        };
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("duplicate device id"));
    }

    #[test]
    fn test_zero_frequency() {
        let mut bp = blueprint();
        let mut dev = device("pad");
        dev.frequency_hz = 0.0;
        bp.driver = DriverConfig::Mock { devices: vec![dev] };
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_unusable_frequency() {
        for hz in [f64::NAN, f64::INFINITY, -1.0, 1e-320] {
            let mut bp = blueprint();
            let mut dev = device("pad");
            dev.frequency_hz = hz;
            bp.driver = DriverConfig::Mock { devices: vec![dev] };
            assert!(validate(&bp).is_err(), "frequency {hz} accepted");
        }
    }

    #[test]
    fn test_too_many_contacts() {
        let mut bp = blueprint();
        let mut dev = device("pad");
        dev.contacts = MAX_CONTACTS + 1;
        bp.driver = DriverConfig::Mock { devices: vec![dev] };
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_duplicate_consumer_name() {
        let mut bp = blueprint();
        bp.consumers.push(consumer("a", OutputType::Log));
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("duplicate consumer name"));
    }

    #[test]
    fn test_empty_consumer_name() {
        let mut bp = blueprint();
        bp.consumers[0].name.clear();
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_zero_capacity_drop_oldest() {
        let mut bp = blueprint();
        bp.consumers[0].queue = QueuePolicy::DropOldest { capacity: 0 };
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut bp = blueprint();
        bp.consumers[0].output.output_type = OutputType::File;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("path"));

        bp.consumers[0]
            .output
            .params
            .insert("path".to_string(), "out.jsonl".to_string());
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_replay_speed_must_be_positive() {
        let mut bp = blueprint();
        bp.driver = DriverConfig::Replay {
            recordings: Vec::new(),
            speed: 0.0,
            loop_playback: false,
        };
        assert!(validate(&bp).is_err());

        for speed in [f64::NAN, f64::INFINITY, -2.0] {
            bp.driver = DriverConfig::Replay {
                recordings: Vec::new(),
                speed,
                loop_playback: false,
            };
            assert!(validate(&bp).is_err(), "speed {speed} accepted");
        }
    }
}
