//! Mock touch surfaces
//!
//! Synthetic devices whose fingers move in circles at a configured rate.
//! Used for development and tests without multitouch hardware; frames can
//! also be injected synchronously with [`MockDriver::inject_frame`].

use std::f32::consts::TAU;
use std::ops::Deref;
use std::time::Duration;

use contracts::{
    Contact, ContactCallback, ContactState, ContractError, DeviceEnumerator, DeviceId,
    DeviceManager, MockDeviceConfig, Point2,
};

use crate::driver::{source_factory, Sample, SampleSource, SamplingDriver};
use crate::error::DeviceError;

/// Build a touching contact at a normalized position
pub fn touch(identifier: i32, x: f32, y: f32) -> Contact {
    Contact {
        identifier,
        frame: 0,
        state: ContactState::Touching,
        position: Point2::new(x, y),
        velocity: Point2::default(),
        size: 0.5,
        angle: 0.0,
        major_axis: 8.0,
        minor_axis: 6.0,
    }
}

/// Synthetic finger generator
struct CircleSource {
    fingers: u32,
    interval: Duration,
    frame_index: u64,
}

impl CircleSource {
    /// Fails when `frequency_hz` does not yield a usable sampling interval
    fn new(device: &DeviceId, config: &MockDeviceConfig) -> crate::error::Result<Self> {
        let hz = config.frequency_hz;
        if !(hz.is_finite() && hz > 0.0) {
            return Err(DeviceError::start_failed(
                device,
                format!("invalid sampling rate {hz} Hz"),
            ));
        }
        let interval = Duration::try_from_secs_f64(1.0 / hz).map_err(|e| {
            DeviceError::start_failed(device, format!("invalid sampling rate {hz} Hz: {e}"))
        })?;

        Ok(Self {
            fingers: config.contacts,
            interval,
            frame_index: 0,
        })
    }

    fn contact(&self, finger: u32) -> Contact {
        let t = self.frame_index as f32 * self.interval.as_secs_f32();
        let phase = t + finger as f32 * TAU / self.fingers.max(1) as f32;
        let radius = 0.3;
        let state = match self.frame_index {
            1 => ContactState::MakeTouch,
            _ => ContactState::Touching,
        };

        Contact {
            identifier: finger as i32 + 1,
            frame: self.frame_index as i32,
            state,
            position: Point2::new(0.5 + radius * phase.cos(), 0.5 + radius * phase.sin()),
            velocity: Point2::new(-radius * phase.sin(), radius * phase.cos()),
            size: 0.4,
            angle: phase % TAU,
            major_axis: 9.0,
            minor_axis: 7.0,
        }
    }
}

impl SampleSource for CircleSource {
    fn next_sample(&mut self) -> Option<Sample> {
        self.frame_index += 1;
        let contacts = (0..self.fingers).map(|f| self.contact(f)).collect();
        Some(Sample {
            delay: self.interval,
            timestamp: self.frame_index as f64 * self.interval.as_secs_f64(),
            frame_index: self.frame_index,
            contacts,
        })
    }
}

/// Source that never samples; frames only arrive through `inject_frame`
struct ManualSource;

impl SampleSource for ManualSource {
    fn next_sample(&mut self) -> Option<Sample> {
        None
    }
}

/// Mock multitouch driver
///
/// Exposes one synthetic device per config entry, in config order.
pub struct MockDriver {
    inner: SamplingDriver,
}

impl MockDriver {
    /// Create driver from device configs
    pub fn new(devices: &[MockDeviceConfig]) -> Self {
        let mut inner = SamplingDriver::new();
        for config in devices {
            let config = config.clone();
            inner.add_device(
                DeviceId::new(&config.id),
                source_factory(move |device| CircleSource::new(device, &config)),
            );
        }
        Self { inner }
    }

    /// Create driver with default device settings
    pub fn with_devices(ids: &[&str]) -> Self {
        let configs: Vec<MockDeviceConfig> = ids
            .iter()
            .map(|id| MockDeviceConfig {
                id: id.to_string(),
                frequency_hz: 60.0,
                contacts: 2,
            })
            .collect();
        Self::new(&configs)
    }

    /// Create driver whose devices only deliver injected frames
    pub fn manual(ids: &[&str]) -> Self {
        let mut inner = SamplingDriver::new();
        for id in ids {
            inner.add_device(DeviceId::new(id), source_factory(|_| Ok(ManualSource)));
        }
        Self { inner }
    }
}

impl Deref for MockDriver {
    type Target = SamplingDriver;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DeviceEnumerator for MockDriver {
    fn list_devices(&self) -> Vec<DeviceId> {
        self.inner.list_devices()
    }
}

impl DeviceManager for MockDriver {
    fn register_callback(
        &self,
        device: &DeviceId,
        callback: Option<ContactCallback>,
    ) -> Result<(), ContractError> {
        self.inner.register_callback(device, callback)
    }

    fn start(&self, device: &DeviceId) -> Result<(), ContractError> {
        self.inner.start(device)
    }

    fn stop(&self, device: &DeviceId) -> Result<(), ContractError> {
        self.inner.stop(device)
    }

    fn release(&self, device: &DeviceId) -> Result<(), ContractError> {
        self.inner.release(device)
    }
}
