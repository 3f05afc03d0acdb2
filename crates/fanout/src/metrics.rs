//! Consumer metrics for observability
//!
//! In-process atomics per consumer, mirrored to the `metrics` facade by the
//! delivery pump (never from inside the process lock).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use contracts::DeviceId;
use metrics::{counter, describe_counter, describe_gauge, gauge};

pub const FRAMES_DISTRIBUTED: &str = "touchfan_frames_distributed_total";
pub const FRAMES_EMITTED: &str = "touchfan_frames_emitted_total";
pub const FRAMES_DROPPED: &str = "touchfan_frames_dropped_total";
pub const SESSIONS_OPEN: &str = "touchfan_sessions_open";
pub const QUEUE_DEPTH: &str = "touchfan_queue_depth";
pub const DEVICE_OPEN_FAILURES: &str = "touchfan_device_open_failures_total";

/// Register descriptions for every touchfan metric
pub fn describe_metrics() {
    describe_counter!(FRAMES_DISTRIBUTED, "Frames built by the distribution callback");
    describe_counter!(FRAMES_EMITTED, "Frames handed to consumer outputs");
    describe_counter!(FRAMES_DROPPED, "Frames released by a drop_oldest queue");
    describe_gauge!(SESSIONS_OPEN, "Device sessions currently open");
    describe_gauge!(QUEUE_DEPTH, "Frames waiting in a subscriber queue");
    describe_counter!(DEVICE_OPEN_FAILURES, "Failed device session opens");
}

pub(crate) fn record_distributed(device: &DeviceId) {
    counter!(FRAMES_DISTRIBUTED, "device" => device.to_string()).increment(1);
}

pub(crate) fn record_sessions_open(count: usize) {
    gauge!(SESSIONS_OPEN).set(count as f64);
}

pub(crate) fn record_open_failure(device: &DeviceId) {
    counter!(DEVICE_OPEN_FAILURES, "device" => device.to_string()).increment(1);
}

/// Metrics for a single consumer
#[derive(Debug, Default)]
pub struct ConsumerMetrics {
    name: String,
    /// Frames currently queued
    queue_depth: AtomicUsize,
    /// Frames appended by the distribution callback
    queued_count: AtomicU64,
    /// Frames the output accepted
    emitted_count: AtomicU64,
    /// Frames the output rejected
    failed_count: AtomicU64,
    /// Frames released unseen by a bounded queue
    dropped_count: AtomicU64,
}

impl ConsumerMetrics {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn queued_count(&self) -> u64 {
        self.queued_count.load(Ordering::Relaxed)
    }

    pub fn emitted_count(&self) -> u64 {
        self.emitted_count.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed_count.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub(crate) fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub(crate) fn inc_queued(&self) {
        self.queued_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_dropped(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one output call and publish to the metrics facade
    pub(crate) fn record_emit(&self, success: bool) {
        let status = if success {
            self.emitted_count.fetch_add(1, Ordering::Relaxed);
            "success"
        } else {
            self.failed_count.fetch_add(1, Ordering::Relaxed);
            "failure"
        };
        counter!(
            FRAMES_EMITTED,
            "consumer" => self.name.clone(),
            "status" => status
        )
        .increment(1);
        self.publish();
    }

    /// Mirror queue depth and drop totals to the metrics facade
    pub(crate) fn publish(&self) {
        gauge!(QUEUE_DEPTH, "consumer" => self.name.clone()).set(self.queue_depth() as f64);
        counter!(FRAMES_DROPPED, "consumer" => self.name.clone()).absolute(self.dropped_count());
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> ConsumerSnapshot {
        ConsumerSnapshot {
            queue_depth: self.queue_depth(),
            queued: self.queued_count(),
            emitted: self.emitted_count(),
            failed: self.failed_count(),
            dropped: self.dropped_count(),
        }
    }
}

/// Snapshot of consumer metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerSnapshot {
    pub queue_depth: usize,
    pub queued: u64,
    pub emitted: u64,
    pub failed: u64,
    pub dropped: u64,
}
