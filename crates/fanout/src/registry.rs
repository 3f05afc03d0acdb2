//! Device session registry
//!
//! Tracks which consumers are attached to which device sessions, owns the
//! open/close lifecycle of the hardware connection, and hosts the
//! distribution callback invoked from the driver thread.
//!
//! Invariant: a session is present in the map if and only if its attached
//! set is non-empty. Every mutation happens under the process lock; every
//! driver call happens with it released.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use contracts::{
    ConsumerId, ContactCallback, ContactReport, ContractError, DeviceDriver, DeviceId, Frame,
    FrameRef, QueuePolicy,
};
use tokio::sync::Notify;
use tracing::{debug, enabled, instrument, trace, warn, Level};

use crate::critical::ProcessLock;
use crate::error::{FanoutError, Result};
use crate::metrics::{self, ConsumerMetrics};

/// Lifecycle phase of a device session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Driver `register_callback`/`start` in flight
    Opening,
    /// Hardware connection started
    Running,
}

/// Point-in-time view of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub device: DeviceId,
    pub phase: SessionPhase,
    pub consumers: Vec<ConsumerId>,
}

struct DeviceSession {
    phase: SessionPhase,
    consumers: BTreeSet<ConsumerId>,
}

/// Per-consumer FIFO of frame references plus its wake signal.
///
/// `Notify` keeps at most one stored permit, which is the pending-wake flag.
struct SubscriberQueue {
    frames: VecDeque<FrameRef>,
    policy: QueuePolicy,
    wake: Arc<Notify>,
    device: Option<DeviceId>,
    metrics: Arc<ConsumerMetrics>,
    /// Front frame is being emitted by the pump
    in_flight: bool,
}

impl SubscriberQueue {
    fn push(&mut self, frame: FrameRef) {
        if let QueuePolicy::DropOldest { capacity } = self.policy {
            while self.frames.len() >= capacity.max(1) {
                self.frames.pop_front();
                // An evicted in-flight frame is still counted by its emit
                if std::mem::take(&mut self.in_flight) {
                    continue;
                }
                self.metrics.inc_dropped();
            }
        }
        self.frames.push_back(frame);
        self.metrics.inc_queued();
        self.metrics.set_queue_depth(self.frames.len());
        self.wake.notify_one();
    }
}

#[derive(Default)]
struct State {
    sessions: HashMap<DeviceId, DeviceSession>,
    queues: HashMap<ConsumerId, SubscriberQueue>,
    /// Devices whose driver close is in flight
    closing: HashSet<DeviceId>,
}

impl State {
    fn is_opening(&self, device: &DeviceId) -> bool {
        self.sessions
            .get(device)
            .is_some_and(|s| s.phase == SessionPhase::Opening)
    }

    fn is_transitioning(&self, device: &DeviceId) -> bool {
        self.closing.contains(device) || self.is_opening(device)
    }
}

/// Handles a delivery pump needs for one consumer
pub(crate) struct Subscription {
    pub(crate) consumer: ConsumerId,
    pub(crate) wake: Arc<Notify>,
    pub(crate) metrics: Arc<ConsumerMetrics>,
}

/// What the delivery pump should do next
pub(crate) enum Next {
    Deliver(FrameRef),
    Idle,
    Gone,
}

struct Inner {
    lock: ProcessLock<State>,
    driver: Arc<dyn DeviceDriver>,
}

impl Inner {
    /// Distribution callback body, run on the driver thread
    fn distribute(&self, report: ContactReport<'_>) {
        let mut state = self.lock.lock();
        let State {
            sessions, queues, ..
        } = &mut *state;
        // No session: teardown raced the driver thread
        let Some(session) = sessions.get(report.device) else {
            return;
        };

        let frame = Frame::create(
            report.device.clone(),
            report.frame_index,
            report.timestamp,
            report.contacts,
        );
        for consumer in &session.consumers {
            if let Some(queue) = queues.get_mut(consumer) {
                queue.push(Arc::clone(&frame));
            }
        }
        let recipients = session.consumers.len();
        drop(frame);
        drop(state);

        metrics::record_distributed(report.device);
        trace!(
            device = %report.device,
            frame_index = report.frame_index,
            contacts = report.contacts.len(),
            recipients,
            "Frame distributed"
        );
    }

    fn open_device(
        &self,
        device: &DeviceId,
        callback: ContactCallback,
    ) -> std::result::Result<(), ContractError> {
        self.driver.register_callback(device, Some(callback))?;
        if let Err(e) = self.driver.start(device) {
            log_close_step(device, "unregister", self.driver.register_callback(device, None));
            log_close_step(device, "release", self.driver.release(device));
            return Err(e);
        }
        Ok(())
    }

    fn close_device(&self, device: &DeviceId) {
        log_close_step(device, "unregister", self.driver.register_callback(device, None));
        log_close_step(device, "stop", self.driver.stop(device));
        log_close_step(device, "release", self.driver.release(device));
    }
}

fn log_close_step(device: &DeviceId, step: &str, result: std::result::Result<(), ContractError>) {
    if let Err(e) = result {
        warn!(device = %device, step, error = %e, "Device close step failed");
    }
}

/// Process-wide map from device identity to its attached consumers.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    /// Create an empty registry over a device driver
    pub fn new(driver: Arc<dyn DeviceDriver>) -> Self {
        Self {
            inner: Arc::new(Inner {
                lock: ProcessLock::new(State::default()),
                driver,
            }),
        }
    }

    /// Devices currently enumerated by the driver
    pub fn devices(&self) -> Vec<DeviceId> {
        self.inner.driver.list_devices()
    }

    /// Create a detached consumer with an empty subscriber queue
    pub fn register_consumer(&self, name: impl Into<String>, policy: QueuePolicy) -> ConsumerId {
        self.subscribe(name, policy).consumer
    }

    pub(crate) fn subscribe(&self, name: impl Into<String>, policy: QueuePolicy) -> Subscription {
        let subscription = Subscription {
            consumer: ConsumerId::next(),
            wake: Arc::new(Notify::new()),
            metrics: Arc::new(ConsumerMetrics::new(name)),
        };
        let queue = SubscriberQueue {
            frames: VecDeque::new(),
            policy,
            wake: Arc::clone(&subscription.wake),
            device: None,
            metrics: Arc::clone(&subscription.metrics),
            in_flight: false,
        };
        self.inner
            .lock
            .lock()
            .queues
            .insert(subscription.consumer, queue);
        subscription
    }

    /// Detach a consumer and drop its queue.
    ///
    /// Returns the number of queued frames released. Unknown consumers are a
    /// no-op.
    #[instrument(name = "registry_unregister_consumer", skip_all, fields(consumer = %consumer))]
    pub fn unregister_consumer(&self, consumer: ConsumerId) -> usize {
        let removed = loop {
            self.detach_consumer(consumer);
            let mut state = self.inner.lock.lock();
            let attached = state.queues.get(&consumer).map(|q| q.device.is_some());
            match attached {
                None => break None,
                // Re-attached concurrently; detach again
                Some(true) => continue,
                Some(false) => break state.queues.remove(&consumer),
            }
        };

        let Some(queue) = removed else {
            return 0;
        };
        let released = queue.frames.len();
        queue.metrics.set_queue_depth(0);
        queue.wake.notify_one();
        drop(queue);
        debug!(released, "Consumer unregistered");
        released
    }

    /// Attach `consumer` to `device`, opening the session if needed.
    ///
    /// Attaching to the device the consumer already holds is a no-op.
    #[instrument(name = "registry_attach", skip_all, fields(consumer = %consumer, device = %device))]
    pub fn attach(&self, consumer: ConsumerId, device: &DeviceId) -> Result<()> {
        let inner = &self.inner;
        let mut state = inner.lock.lock();
        loop {
            let queue = state
                .queues
                .get(&consumer)
                .ok_or(FanoutError::UnknownConsumer { consumer })?;
            match &queue.device {
                Some(current) if current == device => return Ok(()),
                Some(current) => {
                    return Err(FanoutError::AlreadyAttached {
                        consumer,
                        device: current.clone(),
                    })
                }
                None => {}
            }
            if !state.is_transitioning(device) {
                break;
            }
            state = inner
                .lock
                .wait_while(state, |s| s.is_transitioning(device));
        }

        let State {
            sessions, queues, ..
        } = &mut *state;
        if let Some(queue) = queues.get_mut(&consumer) {
            queue.device = Some(device.clone());
        }
        if let Some(session) = sessions.get_mut(device) {
            session.consumers.insert(consumer);
            let attached = session.consumers.len();
            drop(state);
            debug!(attached, "Joined open session");
            self.log_snapshot();
            return Ok(());
        }

        sessions.insert(
            device.clone(),
            DeviceSession {
                phase: SessionPhase::Opening,
                consumers: BTreeSet::from([consumer]),
            },
        );
        let callback = self.callback();
        let (mut state, opened) = inner
            .lock
            .with_lock_released(state, || inner.open_device(device, callback));

        match opened {
            Ok(()) => {
                if let Some(session) = state.sessions.get_mut(device) {
                    session.phase = SessionPhase::Running;
                }
                let open = state.sessions.len();
                drop(state);
                inner.lock.notify_settled();

                metrics::record_sessions_open(open);
                debug!("Device session opened");
                self.log_snapshot();
                Ok(())
            }
            Err(source) => {
                let State {
                    sessions, queues, ..
                } = &mut *state;
                if let Some(session) = sessions.remove(device) {
                    for id in &session.consumers {
                        if let Some(queue) = queues.get_mut(id) {
                            queue.device = None;
                        }
                    }
                }
                drop(state);
                inner.lock.notify_settled();

                metrics::record_open_failure(device);
                warn!(error = %source, "Device open failed, session rolled back");
                Err(FanoutError::DeviceOpen {
                    device: device.clone(),
                    source,
                })
            }
        }
    }

    /// Detach `consumer` from `device`, closing the session when it empties.
    ///
    /// Safe at any time; a consumer that is not attached to `device` is a
    /// no-op. Frames already queued stay with the consumer.
    #[instrument(name = "registry_detach", skip_all, fields(consumer = %consumer, device = %device))]
    pub fn detach(&self, consumer: ConsumerId, device: &DeviceId) {
        let inner = &self.inner;
        let state = inner.lock.lock();
        let mut state = inner.lock.wait_while(state, |s| s.is_opening(device));

        let State {
            sessions,
            queues,
            closing,
        } = &mut *state;
        let Some(session) = sessions.get_mut(device) else {
            return;
        };
        if !session.consumers.remove(&consumer) {
            return;
        }
        if let Some(queue) = queues.get_mut(&consumer) {
            if queue.device.as_ref() == Some(device) {
                queue.device = None;
            }
        }

        if !session.consumers.is_empty() {
            let remaining = session.consumers.len();
            drop(state);
            debug!(remaining, "Consumer left session");
            self.log_snapshot();
            return;
        }

        sessions.remove(device);
        closing.insert(device.clone());
        let open = sessions.len();
        let (mut state, ()) = inner
            .lock
            .with_lock_released(state, || inner.close_device(device));
        state.closing.remove(device);
        drop(state);
        inner.lock.notify_settled();

        metrics::record_sessions_open(open);
        debug!("Device session closed");
        self.log_snapshot();
    }

    /// Detach `consumer` from whatever device it holds
    pub fn detach_consumer(&self, consumer: ConsumerId) -> Option<DeviceId> {
        let device = self.attached_device(consumer)?;
        self.detach(consumer, &device);
        Some(device)
    }

    /// Move `consumer` to `device`: detach from the current device, then attach
    #[instrument(name = "registry_rebind", skip_all, fields(consumer = %consumer, device = %device))]
    pub fn rebind(&self, consumer: ConsumerId, device: &DeviceId) -> Result<()> {
        match self.attached_device(consumer) {
            Some(current) if &current == device => return Ok(()),
            Some(current) => self.detach(consumer, &current),
            None => {}
        }
        self.attach(consumer, device)
    }

    /// Select a device by 1-based enumeration index.
    ///
    /// `index <= 0` detaches; an out-of-range index clamps to the last
    /// device; with no devices enumerated the consumer is detached.
    #[instrument(name = "registry_select_device", skip_all, fields(consumer = %consumer))]
    pub fn select_device(&self, consumer: ConsumerId, index: i64) -> Result<Option<DeviceId>> {
        if index <= 0 {
            self.detach_consumer(consumer);
            return Ok(None);
        }

        let devices = self.devices();
        let Some(last) = devices.len().checked_sub(1) else {
            debug!("No devices enumerated");
            self.detach_consumer(consumer);
            return Ok(None);
        };
        let position = usize::try_from(index - 1).unwrap_or(usize::MAX).min(last);
        let device = devices[position].clone();

        self.rebind(consumer, &device)?;
        Ok(Some(device))
    }

    /// Device the consumer is currently attached to
    pub fn attached_device(&self, consumer: ConsumerId) -> Option<DeviceId> {
        self.inner
            .lock
            .lock()
            .queues
            .get(&consumer)
            .and_then(|q| q.device.clone())
    }

    /// Consumers attached to `device`, `None` when no session exists
    pub fn session_consumers(&self, device: &DeviceId) -> Option<Vec<ConsumerId>> {
        self.inner
            .lock
            .lock()
            .sessions
            .get(device)
            .map(|s| s.consumers.iter().copied().collect())
    }

    /// Number of open (or opening) sessions
    pub fn session_count(&self) -> usize {
        self.inner.lock.lock().sessions.len()
    }

    /// Every session with its attached consumers, ordered by device
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let state = self.inner.lock.lock();
        let mut sessions: Vec<SessionInfo> = state
            .sessions
            .iter()
            .map(|(device, session)| SessionInfo {
                device: device.clone(),
                phase: session.phase,
                consumers: session.consumers.iter().copied().collect(),
            })
            .collect();
        drop(state);
        sessions.sort_by(|a, b| a.device.cmp(&b.device));
        sessions
    }

    /// Frames waiting in the consumer's queue, oldest first
    pub fn queued_frames(&self, consumer: ConsumerId) -> Vec<FrameRef> {
        self.inner
            .lock
            .lock()
            .queues
            .get(&consumer)
            .map(|q| q.frames.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Length of the consumer's queue
    pub fn queue_len(&self, consumer: ConsumerId) -> usize {
        self.inner
            .lock
            .lock()
            .queues
            .get(&consumer)
            .map_or(0, |q| q.frames.len())
    }

    /// Metrics of a registered consumer
    pub fn consumer_metrics(&self, consumer: ConsumerId) -> Option<Arc<ConsumerMetrics>> {
        self.inner
            .lock
            .lock()
            .queues
            .get(&consumer)
            .map(|q| Arc::clone(&q.metrics))
    }

    /// Front of the queue, retained for delivery outside the lock
    pub(crate) fn next_frame(&self, consumer: ConsumerId) -> Next {
        let mut state = self.inner.lock.lock();
        let Some(queue) = state.queues.get_mut(&consumer) else {
            return Next::Gone;
        };
        match queue.frames.front() {
            Some(frame) => {
                queue.in_flight = true;
                Next::Deliver(Arc::clone(frame))
            }
            None => Next::Idle,
        }
    }

    /// Pop `frame` after delivery, unless a bounded queue already dropped it
    pub(crate) fn complete(&self, consumer: ConsumerId, frame: &FrameRef) {
        let mut state = self.inner.lock.lock();
        if let Some(queue) = state.queues.get_mut(&consumer) {
            if queue
                .frames
                .front()
                .is_some_and(|front| Arc::ptr_eq(front, frame))
            {
                queue.frames.pop_front();
            }
            queue.in_flight = false;
            queue.metrics.set_queue_depth(queue.frames.len());
        }
    }

    fn callback(&self) -> ContactCallback {
        let registry = Arc::downgrade(&self.inner);
        Arc::new(move |report: ContactReport<'_>| {
            if let Some(inner) = registry.upgrade() {
                inner.distribute(report);
            }
        })
    }

    fn log_snapshot(&self) {
        if enabled!(Level::DEBUG) {
            let sessions = self.snapshot();
            debug!(?sessions, "Registry state");
        }
    }
}
