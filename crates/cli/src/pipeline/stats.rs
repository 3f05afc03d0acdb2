//! Run statistics.

use std::time::Duration;

use observability::DeliveryAggregator;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total run duration
    pub duration: Duration,

    /// Stopped by a shutdown signal rather than the deadline
    pub interrupted: bool,

    /// Devices enumerated by the driver
    pub devices: usize,

    /// Consumers started
    pub consumers: usize,

    /// Most device sessions observed open at once
    pub sessions_peak: usize,

    /// Per-consumer delivery statistics
    pub delivery: DeliveryAggregator,
}

impl PipelineStats {
    /// Frames emitted per second across all consumers
    pub fn emit_rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.delivery.summary().total_emitted as f64 / secs
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Run Statistics ===\n");
        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Devices: {}", self.devices);
        println!("   ├─ Consumers: {}", self.consumers);
        println!("   ├─ Peak sessions: {}", self.sessions_peak);
        println!("   └─ Emit rate: {:.2} frames/s", self.emit_rate());
        println!();
        print!("{}", self.delivery.summary());
        println!();
    }
}
