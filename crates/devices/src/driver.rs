//! Sampling driver core
//!
//! Device table shared by the mock and replay drivers: callback registration,
//! one sampling thread per started device, and per-device call accounting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    Contact, ContactCallback, ContactReport, ContractError, DeviceEnumerator, DeviceId,
    DeviceManager,
};
use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, trace, warn};

use crate::error::{DeviceError, Result};

/// One sample produced by a source, delivered after `delay`
#[derive(Debug, Clone)]
pub struct Sample {
    pub delay: Duration,
    pub timestamp: f64,
    pub frame_index: u64,
    pub contacts: Vec<Contact>,
}

/// Producer of samples for one started device
pub trait SampleSource: Send + 'static {
    /// Next sample, `None` once the source is exhausted
    fn next_sample(&mut self) -> Option<Sample>;
}

/// Builds a fresh source every time the device is started
pub type SourceFactory = Box<dyn Fn(&DeviceId) -> Result<Box<dyn SampleSource>> + Send + Sync>;

/// Box a closure returning a concrete source as a [`SourceFactory`]
pub fn source_factory<F, S>(build: F) -> SourceFactory
where
    F: Fn(&DeviceId) -> Result<S> + Send + Sync + 'static,
    S: SampleSource,
{
    Box::new(move |device: &DeviceId| Ok(Box::new(build(device)?) as Box<dyn SampleSource>))
}

/// Number of management calls a device has received
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub registered: u32,
    pub unregistered: u32,
    pub started: u32,
    pub stopped: u32,
    pub released: u32,
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct DeviceSlot {
    factory: SourceFactory,
    callback: Arc<RwLock<Option<ContactCallback>>>,
    worker: Option<Worker>,
    calls: CallCounts,
    fail_start: bool,
    injected_frames: u64,
}

/// Driver that samples each started device on its own thread.
///
/// The registered callback runs on that thread; `stop` joins it, so no
/// callback is in flight once `stop` returns.
pub struct SamplingDriver {
    order: Vec<DeviceId>,
    slots: Mutex<HashMap<DeviceId, DeviceSlot>>,
}

impl SamplingDriver {
    /// Create a driver exposing no devices
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Expose a device, appended to the enumeration order
    pub fn add_device(&mut self, device: DeviceId, factory: SourceFactory) {
        if !self.order.contains(&device) {
            self.order.push(device.clone());
        }
        self.slots_mut().insert(
            device,
            DeviceSlot {
                factory,
                callback: Arc::new(RwLock::new(None)),
                worker: None,
                calls: CallCounts::default(),
                fail_start: false,
                injected_frames: 0,
            },
        );
    }

    /// Make subsequent `start` calls for `device` fail
    pub fn fail_start(&self, device: &DeviceId, fail: bool) {
        if let Some(slot) = self.lock_slots().get_mut(device) {
            slot.fail_start = fail;
        }
    }

    /// Management calls received by `device`
    pub fn calls(&self, device: &DeviceId) -> CallCounts {
        self.lock_slots()
            .get(device)
            .map(|slot| slot.calls)
            .unwrap_or_default()
    }

    /// Whether a sampling thread is active for `device`
    pub fn is_running(&self, device: &DeviceId) -> bool {
        self.lock_slots()
            .get(device)
            .and_then(|slot| slot.worker.as_ref())
            .is_some_and(|w| w.running.load(Ordering::Acquire))
    }

    /// Whether a callback is currently registered for `device`
    pub fn has_callback(&self, device: &DeviceId) -> bool {
        self.lock_slots()
            .get(device)
            .is_some_and(|slot| read_callback(&slot.callback).is_some())
    }

    /// Deliver one frame synchronously on the calling thread, as if the
    /// hardware had sampled it.
    ///
    /// Returns `false` when no callback is registered for `device`.
    pub fn inject_frame(&self, device: &DeviceId, timestamp: f64, contacts: &[Contact]) -> bool {
        let (callback, frame_index) = {
            let mut slots = self.lock_slots();
            let Some(slot) = slots.get_mut(device) else {
                return false;
            };
            let Some(callback) = read_callback(&slot.callback) else {
                return false;
            };
            slot.injected_frames += 1;
            (callback, slot.injected_frames)
        };

        callback(ContactReport {
            device,
            contacts,
            timestamp,
            frame_index,
        });
        true
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<DeviceId, DeviceSlot>> {
        self.slots.lock()
    }

    fn slots_mut(&mut self) -> &mut HashMap<DeviceId, DeviceSlot> {
        self.slots.get_mut()
    }

    fn start_device(&self, device: &DeviceId) -> Result<()> {
        let mut slots = self.lock_slots();
        let slot = slots
            .get_mut(device)
            .ok_or_else(|| DeviceError::UnknownDevice {
                device: device.clone(),
            })?;
        slot.calls.started += 1;

        if slot.fail_start {
            return Err(DeviceError::start_failed(device, "start rejected by driver"));
        }
        if slot
            .worker
            .as_ref()
            .is_some_and(|w| w.running.load(Ordering::Acquire))
        {
            warn!(device = %device, "device already started");
            return Ok(());
        }

        let source = (slot.factory)(device)?;
        let running = Arc::new(AtomicBool::new(true));
        let handle = thread::Builder::new()
            .name(format!("touch-{device}"))
            .spawn({
                let device = device.clone();
                let callback = Arc::clone(&slot.callback);
                let running = Arc::clone(&running);
                move || sampling_loop(device, source, callback, running)
            })?;

        slot.worker = Some(Worker { running, handle });
        debug!(device = %device, "device started");
        Ok(())
    }

    fn stop_device(&self, device: &DeviceId) -> Result<()> {
        // The sampling thread may be blocked in the callback; join outside the table lock.
        let worker = {
            let mut slots = self.lock_slots();
            let slot = slots
                .get_mut(device)
                .ok_or_else(|| DeviceError::UnknownDevice {
                    device: device.clone(),
                })?;
            slot.calls.stopped += 1;
            slot.worker.take()
        };

        if let Some(worker) = worker {
            worker.running.store(false, Ordering::Release);
            worker.handle.thread().unpark();
            if worker.handle.thread().id() == thread::current().id() {
                warn!(device = %device, "stop called from the sampling thread, not joining");
            } else if worker.handle.join().is_err() {
                warn!(device = %device, "sampling thread panicked");
            }
            debug!(device = %device, "device stopped");
        }
        Ok(())
    }
}

impl Default for SamplingDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceEnumerator for SamplingDriver {
    fn list_devices(&self) -> Vec<DeviceId> {
        self.order.clone()
    }
}

impl DeviceManager for SamplingDriver {
    fn register_callback(
        &self,
        device: &DeviceId,
        callback: Option<ContactCallback>,
    ) -> std::result::Result<(), ContractError> {
        let mut slots = self.lock_slots();
        let slot = slots
            .get_mut(device)
            .ok_or_else(|| ContractError::DeviceNotFound {
                device: device.clone(),
            })?;

        if callback.is_some() {
            slot.calls.registered += 1;
        } else {
            slot.calls.unregistered += 1;
        }
        *slot.callback.write() = callback;
        Ok(())
    }

    fn start(&self, device: &DeviceId) -> std::result::Result<(), ContractError> {
        Ok(self.start_device(device)?)
    }

    fn stop(&self, device: &DeviceId) -> std::result::Result<(), ContractError> {
        Ok(self.stop_device(device)?)
    }

    fn release(&self, device: &DeviceId) -> std::result::Result<(), ContractError> {
        let mut slots = self.lock_slots();
        let slot = slots
            .get_mut(device)
            .ok_or_else(|| ContractError::DeviceNotFound {
                device: device.clone(),
            })?;
        slot.calls.released += 1;
        Ok(())
    }
}

fn read_callback(cell: &RwLock<Option<ContactCallback>>) -> Option<ContactCallback> {
    cell.read().clone()
}

fn sampling_loop(
    device: DeviceId,
    mut source: Box<dyn SampleSource>,
    callback: Arc<RwLock<Option<ContactCallback>>>,
    running: Arc<AtomicBool>,
) {
    debug!(device = %device, "sampling thread started");

    while running.load(Ordering::Acquire) {
        let Some(sample) = source.next_sample() else {
            debug!(device = %device, "sample source exhausted");
            break;
        };

        let Some(deadline) = Instant::now().checked_add(sample.delay) else {
            warn!(device = %device, delay = ?sample.delay, "sample delay out of range");
            break;
        };
        loop {
            let now = Instant::now();
            if now >= deadline || !running.load(Ordering::Acquire) {
                break;
            }
            thread::park_timeout(deadline - now);
        }
        if !running.load(Ordering::Acquire) {
            break;
        }

        if let Some(callback) = read_callback(&callback) {
            callback(ContactReport {
                device: &device,
                contacts: &sample.contacts,
                timestamp: sample.timestamp,
                frame_index: sample.frame_index,
            });
            trace!(
                device = %device,
                frame_index = sample.frame_index,
                contacts = sample.contacts.len(),
                "sample delivered"
            );
        }
    }

    running.store(false, Ordering::Release);
    debug!(device = %device, "sampling thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct Counting {
        next: u64,
        limit: u64,
    }

    impl SampleSource for Counting {
        fn next_sample(&mut self) -> Option<Sample> {
            if self.next >= self.limit {
                return None;
            }
            self.next += 1;
            Some(Sample {
                delay: Duration::from_millis(1),
                timestamp: self.next as f64,
                frame_index: self.next,
                contacts: Vec::new(),
            })
        }
    }

    fn driver(limit: u64) -> SamplingDriver {
        let mut driver = SamplingDriver::new();
        driver.add_device(
            "dev".into(),
            source_factory(move |_| Ok(Counting { next: 0, limit })),
        );
        driver
    }

    #[test]
    fn test_unknown_device() {
        let driver = driver(1);
        let err = driver.start(&"nope".into()).unwrap_err();
        assert!(matches!(err, ContractError::DeviceNotFound { .. }));
    }

    #[test]
    fn test_samples_reach_callback_in_order() {
        let driver = driver(5);
        let device: DeviceId = "dev".into();
        let last = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&last);

        driver
            .register_callback(
                &device,
                Some(Arc::new(move |report: ContactReport<'_>| {
                    let prev = seen.swap(report.frame_index, Ordering::SeqCst);
                    assert_eq!(prev + 1, report.frame_index);
                })),
            )
            .unwrap();
        driver.start(&device).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while last.load(Ordering::SeqCst) < 5 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        driver.stop(&device).unwrap();

        assert_eq!(last.load(Ordering::SeqCst), 5);
        assert!(!driver.is_running(&device));
    }

    #[test]
    fn test_call_accounting_and_fail_start() {
        let driver = driver(0);
        let device: DeviceId = "dev".into();

        driver.fail_start(&device, true);
        assert!(driver.start(&device).is_err());
        driver.fail_start(&device, false);
        driver.start(&device).unwrap();
        driver.stop(&device).unwrap();
        driver.release(&device).unwrap();

        let calls = driver.calls(&device);
        assert_eq!(calls.started, 2);
        assert_eq!(calls.stopped, 1);
        assert_eq!(calls.released, 1);
    }

    #[test]
    fn test_inject_requires_callback() {
        let driver = driver(0);
        let device: DeviceId = "dev".into();
        assert!(!driver.inject_frame(&device, 0.0, &[]));

        driver
            .register_callback(&device, Some(Arc::new(|_report: ContactReport<'_>| {})))
            .unwrap();
        assert!(driver.inject_frame(&device, 0.0, &[]));
        assert!(driver.has_callback(&device));

        driver.register_callback(&device, None).unwrap();
        assert!(!driver.inject_frame(&device, 0.0, &[]));
    }
}
