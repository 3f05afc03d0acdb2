//! # Devices
//!
//! Multitouch device drivers.
//!
//! Responsibilities:
//! - Enumerate devices in a stable order
//! - Register the contact callback and run one sampling thread per device
//! - Provide Mock and Replay drivers (no hardware required)

pub mod driver;
pub mod error;
pub mod mock_device;
pub mod replay_device;

use std::sync::Arc;

use contracts::DriverConfig;

pub use contracts::DeviceDriver;
pub use driver::{source_factory, CallCounts, Sample, SampleSource, SamplingDriver, SourceFactory};
pub use error::{DeviceError, Result};
pub use mock_device::{touch, MockDriver};
pub use replay_device::{load_recording, ReplayConfig, ReplayDriver};

/// Build the driver described by a config
pub fn build_driver(config: &DriverConfig) -> Arc<dyn DeviceDriver> {
    match config {
        DriverConfig::Mock { devices } => Arc::new(MockDriver::new(devices)),
        DriverConfig::Replay {
            recordings,
            speed,
            loop_playback,
        } => Arc::new(ReplayDriver::new(
            recordings,
            ReplayConfig {
                speed: *speed,
                loop_playback: *loop_playback,
            },
        )),
    }
}
