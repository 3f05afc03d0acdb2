//! Pipeline orchestrator - wires driver, registry and consumers together.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{DeviceEnumerator, FanoutBlueprint};
use fanout::SessionRegistry;
use observability::DeliveryAggregator;
use outputs::ConsumerGroup;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::PipelineStats;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Loaded configuration
    pub blueprint: FanoutBlueprint,

    /// Run duration (None = until shutdown signal)
    pub duration: Option<Duration>,

    /// Delivery statistics sampling interval
    pub stats_interval: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the configured duration elapses or `shutdown` resolves,
    /// then tear every consumer down.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let driver = devices::build_driver(&blueprint.driver);
        let device_list = driver.list_devices();
        info!(devices = ?device_list, "Driver ready");
        if device_list.is_empty() {
            warn!("No devices enumerated - every consumer stays detached");
        }

        let registry = SessionRegistry::new(driver);
        let group = ConsumerGroup::spawn(&registry, &blueprint.consumers)
            .await
            .context("Failed to start consumers")?;

        let mut stats = PipelineStats {
            devices: device_list.len(),
            consumers: group.len(),
            sessions_peak: registry.session_count(),
            ..Default::default()
        };
        for session in registry.snapshot() {
            info!(
                device = %session.device,
                consumers = session.consumers.len(),
                "Session open"
            );
        }

        info!(duration = ?self.config.duration, "Running");
        let mut delivery = DeliveryAggregator::new();
        let mut ticker = interval(self.config.stats_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let deadline = async {
            match self.config.duration {
                Some(duration) => sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(shutdown, deadline);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping consumers...");
                    stats.interrupted = true;
                    break;
                }
                _ = &mut deadline => {
                    info!("Run duration reached");
                    break;
                }
                _ = ticker.tick() => {
                    delivery.observe(&group.metrics());
                    stats.sessions_peak = stats.sessions_peak.max(registry.session_count());
                    debug!(samples = delivery.samples(), "Delivery statistics sampled");
                }
            }
        }

        info!("Shutting down consumers...");
        let final_metrics = group.shutdown().await;
        delivery.observe(&final_metrics);

        if registry.session_count() > 0 {
            warn!(
                sessions = registry.session_count(),
                "Sessions still open after shutdown"
            );
        }

        stats.delivery = delivery;
        stats.duration = start_time.elapsed();
        info!(
            duration_secs = stats.duration.as_secs_f64(),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}
