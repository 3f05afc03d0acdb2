//! Consumer factory - builds outputs from config and wires them to the registry

use contracts::{ConsumerConfig, OutputType};
use fanout::{Consumer, ConsumerSnapshot, SessionRegistry};
use tracing::{info, instrument, warn};

use crate::error::OutputError;
use crate::outputs::{FileOutput, ListOutput, LogOutput, NetworkOutput};

/// Create the configured output, spawn its consumer, and apply the
/// configured device selection.
///
/// If the device cannot be opened the consumer is torn down again and the
/// error returned.
#[instrument(
    name = "factory_spawn_consumer",
    skip(registry, config),
    fields(consumer = %config.name, output_type = ?config.output.output_type)
)]
pub async fn spawn_consumer(
    registry: &SessionRegistry,
    config: &ConsumerConfig,
) -> Result<Consumer, OutputError> {
    let name = &config.name;
    let params = &config.output.params;
    let consumer = match config.output.output_type {
        OutputType::Log => Consumer::spawn(registry, name, config.queue, LogOutput::new(name)),
        OutputType::List => {
            let output = ListOutput::from_params(name, params)
                .map_err(|e| OutputError::creation(name, e.to_string()))?;
            Consumer::spawn(registry, name, config.queue, output)
        }
        OutputType::File => {
            let output = FileOutput::from_params(name, params)
                .map_err(|e| OutputError::creation(name, e.to_string()))?;
            Consumer::spawn(registry, name, config.queue, output)
        }
        OutputType::Network => {
            let output = NetworkOutput::from_params(name, params)
                .await
                .map_err(|e| OutputError::creation(name, e.to_string()))?;
            Consumer::spawn(registry, name, config.queue, output)
        }
    };

    match consumer.select_device(config.device_index) {
        Ok(device) => {
            info!(
                device = device.as_ref().map(|d| d.as_str()).unwrap_or("-"),
                "Consumer ready"
            );
            Ok(consumer)
        }
        Err(e) => {
            warn!(error = %e, "Device selection failed, tearing consumer down");
            consumer.shutdown().await;
            Err(e.into())
        }
    }
}

/// Consumers built from one configuration, torn down together
pub struct ConsumerGroup {
    consumers: Vec<Consumer>,
}

impl ConsumerGroup {
    /// Wrap already spawned consumers
    pub fn new(consumers: Vec<Consumer>) -> Self {
        Self { consumers }
    }

    /// Spawn every configured consumer, in order.
    ///
    /// On failure the consumers spawned so far are shut down.
    #[instrument(
        name = "factory_spawn_group",
        skip(registry, configs),
        fields(consumer_count = configs.len())
    )]
    pub async fn spawn(
        registry: &SessionRegistry,
        configs: &[ConsumerConfig],
    ) -> Result<Self, OutputError> {
        let mut consumers = Vec::with_capacity(configs.len());
        for config in configs {
            match spawn_consumer(registry, config).await {
                Ok(consumer) => consumers.push(consumer),
                Err(e) => {
                    Self::new(consumers).shutdown().await;
                    return Err(e);
                }
            }
        }
        Ok(Self { consumers })
    }

    pub fn consumers(&self) -> &[Consumer] {
        &self.consumers
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Current metrics for all consumers
    pub fn metrics(&self) -> Vec<(String, ConsumerSnapshot)> {
        self.consumers
            .iter()
            .map(|c| (c.name().to_string(), c.metrics().snapshot()))
            .collect()
    }

    /// Shut every consumer down, returning final metrics
    #[instrument(name = "factory_shutdown_group", skip(self), fields(consumer_count = self.consumers.len()))]
    pub async fn shutdown(self) -> Vec<(String, ConsumerSnapshot)> {
        let mut stats = Vec::with_capacity(self.consumers.len());
        for consumer in self.consumers {
            let name = consumer.name().to_string();
            stats.push((name, consumer.shutdown().await));
        }
        info!(consumers = stats.len(), "Consumers shut down");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{OutputConfig, QueuePolicy};
    use devices::{touch, MockDriver};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn config(name: &str, device_index: i64, output_type: OutputType) -> ConsumerConfig {
        ConsumerConfig {
            name: name.to_string(),
            device_index,
            queue: QueuePolicy::Unbounded,
            output: OutputConfig {
                output_type,
                params: HashMap::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_spawn_consumer_selects_device() {
        let driver = Arc::new(MockDriver::manual(&["a", "b"]));
        let registry = SessionRegistry::new(driver.clone());

        let consumer = spawn_consumer(&registry, &config("viz", 2, OutputType::Log))
            .await
            .unwrap();
        assert_eq!(consumer.device().unwrap().as_str(), "b");

        let idle = spawn_consumer(&registry, &config("idle", 0, OutputType::Log))
            .await
            .unwrap();
        assert_eq!(idle.device(), None);

        consumer.shutdown().await;
        idle.shutdown().await;
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_consumer_rejects_bad_params() {
        let driver = Arc::new(MockDriver::manual(&["a"]));
        let registry = SessionRegistry::new(driver);

        let err = spawn_consumer(&registry, &config("net", 1, OutputType::Network))
            .await
            .err().unwrap();
        assert!(matches!(err, OutputError::Creation { .. }));
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_open_failure_tears_consumer_down() {
        let driver = Arc::new(MockDriver::manual(&["a"]));
        driver.fail_start(&"a".into(), true);
        let registry = SessionRegistry::new(driver.clone());

        let err = spawn_consumer(&registry, &config("viz", 1, OutputType::Log))
            .await
            .err().unwrap();
        assert!(matches!(err, OutputError::Fanout(_)));
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn test_group_file_capture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.jsonl");
        let driver = Arc::new(MockDriver::manual(&["a"]));
        let registry = SessionRegistry::new(driver.clone());

        let mut file = config("capture", 1, OutputType::File);
        file.output
            .params
            .insert("path".to_string(), path.display().to_string());
        let group = ConsumerGroup::spawn(&registry, &[file, config("log", 1, OutputType::Log)])
            .await
            .unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(registry.session_consumers(&"a".into()).unwrap().len(), 2);

        for _ in 0..4 {
            driver.inject_frame(&"a".into(), 0.0, &[touch(1, 0.5, 0.5)]);
        }
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while group.metrics().iter().any(|(_, m)| m.emitted < 4) {
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        let stats = group.shutdown().await;
        assert!(stats.iter().all(|(_, m)| m.emitted == 4));
        let lines = std::fs::read_to_string(&path).unwrap().lines().count();
        assert_eq!(lines, 4);
        assert_eq!(driver.calls(&"a".into()).released, 1);
    }
}
