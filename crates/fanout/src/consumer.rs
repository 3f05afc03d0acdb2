//! Consumer - owned handle over one subscriber and its delivery pump

use std::sync::Arc;

use contracts::{ConsumerId, DeviceId, FrameOutput, QueuePolicy};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::{block_in_place, JoinHandle};
use tracing::{debug, error, instrument};

use crate::error::Result;
use crate::metrics::{ConsumerMetrics, ConsumerSnapshot};
use crate::pump::delivery_pump;
use crate::registry::SessionRegistry;

/// Handle to a running consumer
///
/// Created detached. Dropping the handle tears the consumer down without
/// waiting for the pump; prefer [`Consumer::shutdown`].
///
/// `select_device`, `rebind`, `detach` and teardown are synchronous: they
/// may wait for a device that is opening or closing and join its sampling
/// thread. On a multi-thread runtime that work runs under
/// [`block_in_place`]; on a current-thread runtime it blocks the runtime.
pub struct Consumer {
    id: ConsumerId,
    name: String,
    registry: SessionRegistry,
    metrics: Arc<ConsumerMetrics>,
    pump: Option<JoinHandle<()>>,
}

impl Consumer {
    /// Register a consumer and spawn its delivery pump.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    #[instrument(name = "consumer_spawn", skip_all, fields(consumer = %name.as_ref()))]
    pub fn spawn<O>(
        registry: &SessionRegistry,
        name: impl AsRef<str>,
        policy: QueuePolicy,
        output: O,
    ) -> Self
    where
        O: FrameOutput + 'static,
    {
        let name = name.as_ref().to_string();
        let subscription = registry.subscribe(name.clone(), policy);
        let metrics = Arc::clone(&subscription.metrics);

        let pump = tokio::spawn(delivery_pump(
            registry.clone(),
            subscription.consumer,
            subscription.wake,
            output,
            subscription.metrics,
        ));
        debug!(id = %subscription.consumer, "Consumer spawned");

        Self {
            id: subscription.consumer,
            name,
            registry: registry.clone(),
            metrics,
            pump: Some(pump),
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<ConsumerMetrics> {
        &self.metrics
    }

    /// Device currently attached, if any
    pub fn device(&self) -> Option<DeviceId> {
        self.registry.attached_device(self.id)
    }

    /// Frames waiting for delivery
    pub fn queue_len(&self) -> usize {
        self.registry.queue_len(self.id)
    }

    /// Select a device by 1-based enumeration index (`<= 0` detaches)
    pub fn select_device(&self, index: i64) -> Result<Option<DeviceId>> {
        run_blocking(|| self.registry.select_device(self.id, index))
    }

    /// Switch to `device`
    pub fn rebind(&self, device: &DeviceId) -> Result<()> {
        run_blocking(|| self.registry.rebind(self.id, device))
    }

    /// Detach from the current device; queued frames are still delivered
    pub fn detach(&self) -> Option<DeviceId> {
        run_blocking(|| self.registry.detach_consumer(self.id))
    }

    /// Forced teardown: detach, release queued frames, stop the pump
    /// (which flushes and closes the output).
    #[instrument(name = "consumer_shutdown", skip_all, fields(consumer = %self.name))]
    pub async fn shutdown(mut self) -> ConsumerSnapshot {
        let released = run_blocking(|| self.registry.unregister_consumer(self.id));
        if let Some(pump) = self.pump.take() {
            if let Err(e) = pump.await {
                error!(error = ?e, "Delivery pump panicked");
            }
        }
        debug!(released, "Consumer shut down");
        self.metrics.snapshot()
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if self.pump.take().is_some() {
            let released = run_blocking(|| self.registry.unregister_consumer(self.id));
            debug!(consumer = %self.name, released, "Consumer dropped");
        }
    }
}

/// Run registry work that may block on the condvar or a thread join
fn run_blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => block_in_place(f),
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, Frame};
    use devices::{touch, MockDriver};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, Weak};
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio::time::{sleep, timeout};

    /// Output recording frame indices, optionally gated or failing
    #[derive(Clone, Default)]
    struct RecordingOutput {
        seen: Arc<Mutex<Vec<u64>>>,
        gate: Option<Arc<Semaphore>>,
        fail: bool,
        closed: Arc<AtomicBool>,
        probe: Option<SessionRegistry>,
    }

    impl FrameOutput for RecordingOutput {
        fn name(&self) -> &str {
            "recording"
        }

        async fn emit(
            &mut self,
            _consumer: ConsumerId,
            frame: &Frame,
        ) -> std::result::Result<(), ContractError> {
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            if let Some(registry) = &self.probe {
                // Would deadlock if the pump held the process lock here.
                let _ = registry.snapshot();
            }
            if self.fail {
                return Err(ContractError::output_emit("recording", "mock failure"));
            }
            self.seen.lock().unwrap().push(frame.frame_index());
            Ok(())
        }

        async fn flush(&mut self) -> std::result::Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> std::result::Result<(), ContractError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn setup() -> (Arc<MockDriver>, SessionRegistry, DeviceId) {
        let driver = Arc::new(MockDriver::manual(&["pad"]));
        let registry = SessionRegistry::new(driver.clone());
        (driver, registry, "pad".into())
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        timeout(Duration::from_secs(2), async {
            while !done() {
                sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_pump_delivers_in_order() {
        let (driver, registry, device) = setup();
        let output = RecordingOutput {
            probe: Some(registry.clone()),
            ..Default::default()
        };
        let seen = Arc::clone(&output.seen);
        let closed = Arc::clone(&output.closed);

        let consumer = Consumer::spawn(&registry, "viz", QueuePolicy::Unbounded, output);
        assert_eq!(consumer.select_device(1).unwrap(), Some(device.clone()));

        for _ in 0..10 {
            driver.inject_frame(&device, 0.0, &[touch(1, 0.5, 0.5)]);
        }
        wait_for(|| seen.lock().unwrap().len() == 10).await;
        assert_eq!(*seen.lock().unwrap(), (1..=10).collect::<Vec<u64>>());

        let stats = consumer.shutdown().await;
        assert_eq!(stats.emitted, 10);
        assert_eq!(stats.queue_depth, 0);
        assert!(closed.load(Ordering::SeqCst));
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_slow_consumer_does_not_stall_others() {
        let (driver, registry, device) = setup();
        let gate = Arc::new(Semaphore::new(0));
        let slow_output = RecordingOutput {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        };
        let fast_output = RecordingOutput::default();
        let fast_seen = Arc::clone(&fast_output.seen);

        let slow = Consumer::spawn(&registry, "slow", QueuePolicy::Unbounded, slow_output);
        let fast = Consumer::spawn(&registry, "fast", QueuePolicy::Unbounded, fast_output);
        slow.rebind(&device).unwrap();
        fast.rebind(&device).unwrap();

        for _ in 0..5 {
            driver.inject_frame(&device, 0.0, &[]);
        }
        wait_for(|| fast_seen.lock().unwrap().len() == 5).await;
        assert_eq!(slow.metrics().emitted_count(), 0);
        assert_eq!(slow.queue_len(), 5);

        gate.add_permits(5);
        let slow_metrics = Arc::clone(slow.metrics());
        wait_for(|| slow_metrics.emitted_count() == 5).await;

        slow.shutdown().await;
        fast.shutdown().await;
    }

    #[tokio::test]
    async fn test_failing_output_keeps_draining() {
        let (driver, registry, device) = setup();
        let output = RecordingOutput {
            fail: true,
            ..Default::default()
        };
        let consumer = Consumer::spawn(&registry, "failing", QueuePolicy::Unbounded, output);
        consumer.rebind(&device).unwrap();

        for _ in 0..3 {
            driver.inject_frame(&device, 0.0, &[]);
        }
        let metrics = Arc::clone(consumer.metrics());
        wait_for(|| metrics.failed_count() == 3).await;
        assert_eq!(consumer.queue_len(), 0);

        consumer.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_queued_frames() {
        let (driver, registry, device) = setup();
        let gate = Arc::new(Semaphore::new(0));
        let output = RecordingOutput {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        };
        let closed = Arc::clone(&output.closed);
        let consumer = Consumer::spawn(&registry, "stuck", QueuePolicy::Unbounded, output);
        consumer.rebind(&device).unwrap();

        for _ in 0..3 {
            driver.inject_frame(&device, 0.0, &[touch(1, 0.1, 0.1)]);
        }
        let weak: Vec<Weak<Frame>> = registry
            .queued_frames(consumer.id())
            .iter()
            .map(Arc::downgrade)
            .collect();
        assert_eq!(weak.len(), 3);

        // Let the blocked emit finish once the queue is gone.
        let releaser = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                sleep(Duration::from_millis(20)).await;
                gate.add_permits(1);
            })
        };
        consumer.shutdown().await;
        releaser.await.unwrap();

        assert!(weak.iter().all(|w| w.upgrade().is_none()));
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(driver.calls(&device).released, 1);
    }

    #[tokio::test]
    async fn test_drop_detaches() {
        let (driver, registry, device) = setup();
        let consumer = Consumer::spawn(
            &registry,
            "dropped",
            QueuePolicy::Unbounded,
            RecordingOutput::default(),
        );
        consumer.rebind(&device).unwrap();
        assert_eq!(consumer.device(), Some(device.clone()));

        drop(consumer);
        assert!(registry.snapshot().is_empty());
        assert_eq!(driver.calls(&device).stopped, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_teardown_on_multi_thread_runtime() {
        let driver = Arc::new(MockDriver::with_devices(&["pad"]));
        let registry = SessionRegistry::new(driver.clone());
        let device: DeviceId = "pad".into();

        let kept = Consumer::spawn(
            &registry,
            "kept",
            QueuePolicy::Unbounded,
            RecordingOutput::default(),
        );
        let dropped = Consumer::spawn(
            &registry,
            "dropped",
            QueuePolicy::Unbounded,
            RecordingOutput::default(),
        );
        assert_eq!(kept.select_device(1).unwrap(), Some(device.clone()));
        assert_eq!(dropped.select_device(1).unwrap(), Some(device.clone()));
        assert!(driver.is_running(&device));

        drop(dropped);
        assert_eq!(registry.session_consumers(&device), Some(vec![kept.id()]));

        let metrics = Arc::clone(kept.metrics());
        wait_for(|| metrics.emitted_count() > 0).await;
        kept.shutdown().await;

        assert!(registry.snapshot().is_empty());
        assert!(!driver.is_running(&device));
        assert_eq!(driver.calls(&device).stopped, 1);
    }
}
