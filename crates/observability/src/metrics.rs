//! Delivery statistics
//!
//! Aggregates periodic consumer snapshots into a run summary, and mirrors
//! them into the metrics recorder.

use std::collections::BTreeMap;
use std::fmt;

use fanout::ConsumerSnapshot;
use metrics::gauge;

/// Mirror a consumer snapshot into gauges (one series per consumer)
pub fn record_consumer_snapshot(consumer: &str, snapshot: &ConsumerSnapshot) {
    gauge!("touchfan_consumer_emitted", "consumer" => consumer.to_string())
        .set(snapshot.emitted as f64);
    gauge!("touchfan_consumer_failed", "consumer" => consumer.to_string())
        .set(snapshot.failed as f64);
    gauge!("touchfan_consumer_backlog", "consumer" => consumer.to_string())
        .set(snapshot.queue_depth as f64);
}

/// Per-consumer delivery aggregator
///
/// Fed with snapshots at a fixed interval. Counters are cumulative, so the
/// latest snapshot wins; queue depth is sampled into running stats.
#[derive(Debug, Clone, Default)]
pub struct DeliveryAggregator {
    samples: u64,
    consumers: BTreeMap<String, ConsumerTrack>,
}

#[derive(Debug, Clone, Default)]
struct ConsumerTrack {
    latest: ConsumerSnapshot,
    depth: RunningStats,
}

impl DeliveryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one round of snapshots
    pub fn observe(&mut self, snapshots: &[(String, ConsumerSnapshot)]) {
        self.samples += 1;
        for (name, snapshot) in snapshots {
            let track = self.consumers.entry(name.clone()).or_default();
            track.latest = *snapshot;
            track.depth.push(snapshot.queue_depth as f64);
            record_consumer_snapshot(name, snapshot);
        }
    }

    /// Number of observation rounds
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Build the summary report
    pub fn summary(&self) -> MetricsSummary {
        let consumers: Vec<ConsumerSummary> = self
            .consumers
            .iter()
            .map(|(name, track)| ConsumerSummary {
                name: name.clone(),
                emitted: track.latest.emitted,
                failed: track.latest.failed,
                dropped: track.latest.dropped,
                failure_rate: rate(track.latest.failed, track.latest.emitted + track.latest.failed),
                queue_depth: StatsSummary::from(&track.depth),
            })
            .collect();

        MetricsSummary {
            samples: self.samples,
            total_emitted: consumers.iter().map(|c| c.emitted).sum(),
            total_failed: consumers.iter().map(|c| c.failed).sum(),
            total_dropped: consumers.iter().map(|c| c.dropped).sum(),
            consumers,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn rate(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

/// Run summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub samples: u64,
    pub total_emitted: u64,
    pub total_failed: u64,
    pub total_dropped: u64,
    pub consumers: Vec<ConsumerSummary>,
}

/// Summary for one consumer
#[derive(Debug, Clone, Default)]
pub struct ConsumerSummary {
    pub name: String,
    pub emitted: u64,
    pub failed: u64,
    pub dropped: u64,
    pub failure_rate: f64,
    pub queue_depth: StatsSummary,
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Frames emitted: {}", self.total_emitted)?;
        writeln!(f, "Emit failures: {}", self.total_failed)?;
        writeln!(f, "Frames dropped: {}", self.total_dropped)?;

        for c in &self.consumers {
            writeln!(
                f,
                "  {}: emitted={} failed={} ({:.2}%) dropped={}",
                c.name, c.emitted, c.failed, c.failure_rate, c.dropped
            )?;
            writeln!(f, "    queue depth: {}", c.queue_depth)?;
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.2}, std={:.2} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
