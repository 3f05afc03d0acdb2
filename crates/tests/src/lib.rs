//! # Integration Tests
//!
//! Cross-crate end-to-end tests:
//! - contract snapshots
//! - multi-consumer delivery over sampling devices
//! - concurrent attach/detach from many threads
//! - capture and replay through the file output and replay driver

#[cfg(test)]
mod contract_tests {
    use contracts::{ConsumerConfig, FanoutBlueprint, OutputType, QueuePolicy};

    #[test]
    fn test_blueprint_defaults() {
        let blueprint: FanoutBlueprint = config_loader::ConfigLoader::load_from_str(
            r#"
[driver]
kind = "mock"

[[driver.devices]]
id = "pad-0"

[[consumers]]
name = "viz"
[consumers.output]
output_type = "log"
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let consumer: &ConsumerConfig = &blueprint.consumers[0];
        assert_eq!(consumer.device_index, 1);
        assert_eq!(consumer.queue, QueuePolicy::Unbounded);
        assert_eq!(consumer.output.output_type, OutputType::Log);
        assert_eq!(blueprint.version, contracts::ConfigVersion::V1);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use contracts::{
        ConsumerConfig, DeviceId, Frame, MockDeviceConfig, OutputConfig, OutputType, QueuePolicy,
        RecordingConfig,
    };
    use devices::{touch, MockDriver, ReplayConfig, ReplayDriver};
    use fanout::{Consumer, SessionRegistry};
    use outputs::{ChannelOutput, ConsumerGroup, FileOutput, FileOutputConfig};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    async fn recv_n(rx: &mut mpsc::Receiver<Frame>, n: usize) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(n);
        timeout(Duration::from_secs(5), async {
            while frames.len() < n {
                match rx.recv().await {
                    Some(frame) => frames.push(frame),
                    None => break,
                }
            }
        })
        .await
        .expect("frames not delivered in time");
        frames
    }

    fn mock_device(id: &str, frequency_hz: f64) -> MockDeviceConfig {
        MockDeviceConfig {
            id: id.to_string(),
            frequency_hz,
            contacts: 2,
        }
    }

    /// Two consumers on one sampling device see the same frames in order;
    /// the session survives until the last consumer leaves.
    #[tokio::test]
    async fn test_e2e_shared_session() {
        let driver = Arc::new(MockDriver::new(&[mock_device("pad", 500.0)]));
        let registry = SessionRegistry::new(driver.clone());
        let device = DeviceId::new("pad");

        let (out_a, mut rx_a) = ChannelOutput::new("a", 1024);
        let (out_b, mut rx_b) = ChannelOutput::new("b", 1024);
        let a = Consumer::spawn(&registry, "a", QueuePolicy::Unbounded, out_a);
        let b = Consumer::spawn(&registry, "b", QueuePolicy::Unbounded, out_b);

        // Attach b first so it has seen every frame a sees
        b.select_device(1).unwrap();
        a.select_device(1).unwrap();
        assert_eq!(driver.calls(&device).started, 1);
        assert_eq!(registry.session_consumers(&device).unwrap().len(), 2);

        let frames_a = recv_n(&mut rx_a, 10).await;
        assert!(frames_a
            .windows(2)
            .all(|w| w[0].frame_index() < w[1].frame_index()));
        assert!(frames_a.iter().all(|f| f.device() == &device && f.len() == 2));

        let first = frames_a[0].frame_index();
        let mut frames_b = Vec::new();
        while frames_b.len() < 10 {
            let frame = recv_n(&mut rx_b, 1).await.remove(0);
            if frame.frame_index() >= first {
                frames_b.push(frame);
            }
        }
        assert_eq!(frames_a, frames_b);

        assert_eq!(a.detach(), Some(device.clone()));
        assert!(driver.is_running(&device));
        recv_n(&mut rx_b, 3).await;

        a.shutdown().await;
        b.shutdown().await;
        let calls = driver.calls(&device);
        assert_eq!((calls.started, calls.stopped, calls.released), (1, 1, 1));
        assert!(!driver.is_running(&device));
        assert!(!driver.has_callback(&device));
    }

    /// A stalled consumer with a bounded queue drops its oldest frames while
    /// a healthy consumer on the same device keeps receiving.
    #[tokio::test]
    async fn test_e2e_stalled_consumer_is_isolated() {
        let driver = Arc::new(MockDriver::manual(&["pad"]));
        let registry = SessionRegistry::new(driver.clone());
        let device = DeviceId::new("pad");

        // Receiver never read: the pump blocks after one buffered frame
        let (stalled_out, stalled_rx) = ChannelOutput::new("stalled", 1);
        let (fast_out, mut fast_rx) = ChannelOutput::new("fast", 64);
        let stalled = Consumer::spawn(
            &registry,
            "stalled",
            QueuePolicy::DropOldest { capacity: 4 },
            stalled_out,
        );
        let fast = Consumer::spawn(&registry, "fast", QueuePolicy::Unbounded, fast_out);
        stalled.rebind(&device).unwrap();
        fast.rebind(&device).unwrap();

        for i in 0..20 {
            driver.inject_frame(&device, i as f64 * 0.01, &[touch(1, 0.5, 0.5)]);
        }

        let frames = recv_n(&mut fast_rx, 20).await;
        let indices: Vec<u64> = frames.iter().map(|f| f.frame_index()).collect();
        assert_eq!(indices, (1..=20).collect::<Vec<u64>>());

        assert!(stalled.queue_len() <= 4);
        assert!(stalled.metrics().dropped_count() >= 14);

        fast.shutdown().await;
        // Unblock the pending send so the pump can observe the teardown
        drop(stalled_rx);
        let stats = stalled.shutdown().await;
        assert_eq!(stats.queue_depth, 0);
        assert_eq!(driver.calls(&device).released, 1);
    }

    /// Many threads attach, rebind and detach against live sampling devices.
    /// Afterwards every started device has been stopped and released exactly
    /// once per open.
    #[test]
    fn test_e2e_concurrent_attach_detach() {
        let driver = Arc::new(MockDriver::new(&[
            mock_device("a", 1000.0),
            mock_device("b", 1000.0),
            mock_device("c", 1000.0),
        ]));
        let registry = SessionRegistry::new(driver.clone());
        let devices = registry.devices();

        let workers: Vec<_> = (0..6u64)
            .map(|seed| {
                let registry = registry.clone();
                let devices = devices.clone();
                thread::spawn(move || {
                    let mut rng = StdRng::seed_from_u64(seed);
                    let consumer =
                        registry.register_consumer(format!("worker-{seed}"), QueuePolicy::Unbounded);
                    for _ in 0..200 {
                        match rng.random_range(0..4) {
                            0 => {
                                let device = &devices[rng.random_range(0..devices.len())];
                                registry.rebind(consumer, device).unwrap();
                            }
                            1 => {
                                registry.select_device(consumer, rng.random_range(-1..5)).unwrap();
                            }
                            2 => {
                                registry.detach_consumer(consumer);
                            }
                            _ => thread::yield_now(),
                        }
                        if let Some(device) = registry.attached_device(consumer) {
                            let members = registry.session_consumers(&device).unwrap_or_default();
                            assert!(members.contains(&consumer));
                        }
                    }
                    registry.unregister_consumer(consumer);
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert!(registry.snapshot().is_empty());
        for device in &devices {
            let calls = driver.calls(device);
            assert_eq!(calls.started, calls.stopped, "device {device}");
            assert_eq!(calls.started, calls.released, "device {device}");
            assert_eq!(calls.registered, calls.unregistered, "device {device}");
            assert!(!driver.is_running(device));
        }
    }

    /// Frames captured by the file output replay through the replay driver
    /// with identical contacts and order.
    #[tokio::test]
    async fn test_e2e_capture_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.jsonl");

        // Capture
        let driver = Arc::new(MockDriver::manual(&["pad"]));
        let registry = SessionRegistry::new(driver.clone());
        let device = DeviceId::new("pad");
        let capture = Consumer::spawn(
            &registry,
            "capture",
            QueuePolicy::Unbounded,
            FileOutput::new("capture", FileOutputConfig { path: path.clone() }).unwrap(),
        );
        capture.rebind(&device).unwrap();

        let strokes: Vec<Vec<contracts::Contact>> = (0..5)
            .map(|i| {
                (0..=i % 3)
                    .map(|f| touch(f as i32 + 1, 0.1 * i as f32, 0.2 * f as f32))
                    .collect()
            })
            .collect();
        for (i, contacts) in strokes.iter().enumerate() {
            driver.inject_frame(&device, i as f64 * 0.005, contacts);
        }
        let metrics = Arc::clone(capture.metrics());
        timeout(Duration::from_secs(2), async {
            while metrics.emitted_count() < 5 {
                sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        capture.shutdown().await;

        // Replay
        let replay = Arc::new(ReplayDriver::new(
            &[RecordingConfig {
                id: "capture".to_string(),
                path,
            }],
            ReplayConfig {
                speed: 10.0,
                loop_playback: false,
            },
        ));
        let registry = SessionRegistry::new(replay.clone());
        let (out, mut rx) = ChannelOutput::new("replayed", 16);
        let consumer = Consumer::spawn(&registry, "replayed", QueuePolicy::Unbounded, out);
        assert_eq!(
            consumer.select_device(1).unwrap(),
            Some(DeviceId::new("capture"))
        );

        let frames = recv_n(&mut rx, 5).await;
        let replayed: Vec<Vec<contracts::Contact>> =
            frames.iter().map(|f| f.contacts().to_vec()).collect();
        assert_eq!(replayed, strokes);
        assert!(frames.iter().all(|f| f.device().as_str() == "capture"));

        consumer.shutdown().await;
        assert_eq!(replay.calls(&DeviceId::new("capture")).released, 1);
    }

    /// Configuration through the consumer factory into list and file outputs
    #[tokio::test]
    async fn test_e2e_config_to_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let list_path = dir.path().join("list.txt");
        let file_path = dir.path().join("frames.jsonl");

        let consumer = |name: &str, device_index: i64, output_type, path: &std::path::Path| {
            ConsumerConfig {
                name: name.to_string(),
                device_index,
                queue: QueuePolicy::Unbounded,
                output: OutputConfig {
                    output_type,
                    params: HashMap::from([("path".to_string(), path.display().to_string())]),
                },
            }
        };
        let configs = vec![
            consumer("list", 1, OutputType::List, &list_path),
            consumer("file", 7, OutputType::File, &file_path),
        ];

        let driver = Arc::new(MockDriver::manual(&["left", "right"]));
        let registry = SessionRegistry::new(driver.clone());
        let group = ConsumerGroup::spawn(&registry, &configs).await.unwrap();
        assert_eq!(group.consumers()[0].device().unwrap().as_str(), "left");
        assert_eq!(group.consumers()[1].device().unwrap().as_str(), "right");

        for _ in 0..3 {
            driver.inject_frame(&"left".into(), 0.0, &[touch(1, 0.5, 0.5), touch(2, 0.6, 0.4)]);
            driver.inject_frame(&"right".into(), 0.0, &[touch(1, 0.5, 0.5)]);
        }
        timeout(Duration::from_secs(2), async {
            while group.metrics().iter().any(|(_, m)| m.emitted < 3) {
                sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        let mut aggregator = observability::DeliveryAggregator::new();
        aggregator.observe(&group.shutdown().await);
        assert_eq!(aggregator.summary().total_emitted, 6);

        let list = std::fs::read_to_string(&list_path).unwrap();
        let lines: Vec<&str> = list.lines().collect();
        assert_eq!(lines.len(), 9);
        assert_eq!(lines.iter().filter(|l| **l == "frame").count(), 3);

        let frames = devices::load_recording(&file_path).unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.device().as_str() == "right"));
        assert!(registry.snapshot().is_empty());
    }
}
