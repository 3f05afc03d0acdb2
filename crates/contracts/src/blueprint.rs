//! FanoutBlueprint - Config Loader output
//!
//! Describes the device driver to run, and the consumers attached to it with
//! their queue policy and output routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Device driver
    pub driver: DriverConfig,

    /// Consumers, created in order
    #[serde(default)]
    pub consumers: Vec<ConsumerConfig>,
}

/// Device driver selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverConfig {
    /// Simulated multitouch devices
    Mock {
        #[serde(default)]
        devices: Vec<MockDeviceConfig>,
    },

    /// Recorded JSON-lines captures played back as devices
    Replay {
        #[serde(default)]
        recordings: Vec<RecordingConfig>,

        /// Playback speed multiplier (1.0 = original timing)
        #[serde(default = "default_speed")]
        speed: f64,

        /// Restart each recording when it ends
        #[serde(default)]
        loop_playback: bool,
    },
}

impl DriverConfig {
    /// Number of devices the driver will enumerate
    pub fn device_count(&self) -> usize {
        match self {
            Self::Mock { devices } => devices.len(),
            Self::Replay { recordings, .. } => recordings.len(),
        }
    }

    /// Device ids in enumeration order
    pub fn device_ids(&self) -> Vec<&str> {
        match self {
            Self::Mock { devices } => devices.iter().map(|d| d.id.as_str()).collect(),
            Self::Replay { recordings, .. } => recordings.iter().map(|r| r.id.as_str()).collect(),
        }
    }
}

fn default_speed() -> f64 {
    1.0
}

/// Simulated device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockDeviceConfig {
    /// Unique device identity
    pub id: String,

    /// Sampling frequency (Hz), must be > 0
    #[serde(default = "default_frequency")]
    pub frequency_hz: f64,

    /// Simulated fingers per frame
    #[serde(default = "default_contacts")]
    pub contacts: u32,
}

fn default_frequency() -> f64 {
    60.0
}

fn default_contacts() -> u32 {
    2
}

/// Recorded capture exposed as a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Device identity to expose
    pub id: String,

    /// JSON-lines file written by the file output
    pub path: PathBuf,
}

/// Consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Unique consumer name (logging/metrics)
    pub name: String,

    /// 1-based device selection; <= 0 leaves the consumer detached
    #[serde(default = "default_device_index")]
    pub device_index: i64,

    /// Subscriber queue policy
    #[serde(default)]
    pub queue: QueuePolicy,

    /// Output routing
    pub output: OutputConfig,
}

fn default_device_index() -> i64 {
    1
}

/// Subscriber queue policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Grow without bound while the consumer lags
    #[default]
    Unbounded,

    /// Keep at most `capacity` frames, releasing the oldest on overflow
    DropOldest { capacity: usize },
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output type
    pub output_type: OutputType,

    /// Output-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Output type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    /// Frame summaries through tracing
    Log,
    /// Per-contact 12-value list records
    List,
    /// JSON-lines capture file
    File,
    /// UDP datagrams
    Network,
}
