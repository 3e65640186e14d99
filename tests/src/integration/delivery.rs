//! # Partitioned Cloud Delivery
//!
//! Sink nodes pushing consumed records downstream through a
//! [`msight_runtime::DeliverySink`], with partition keys assigned by the
//! router and delivery failures isolated from the node's lifecycle.

#[cfg(test)]
mod tests {
    use crate::integration::{register_pipeline_types, wait_until, VehicleCount};
    use async_trait::async_trait;
    use msight_bus::{InMemoryBroker, TopicPublisher};
    use msight_runtime::{
        Consume, DeliverySink, NodeBehavior, NodeEngine, NodeError, PartitionRouter,
        PartitionedDelivery, SinkDeliveryError,
    };
    use msight_types::{
        Message, NodeConfig, NodeState, PartitionConfig, PartitionMode,
    };
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Captures every put; optionally fails every second one.
    struct CapturingStream {
        puts: Mutex<Vec<(String, String)>>,
        attempts: AtomicU32,
        fail_every_other: bool,
    }

    impl CapturingStream {
        fn reliable() -> Self {
            Self {
                puts: Mutex::new(Vec::new()),
                attempts: AtomicU32::new(0),
                fail_every_other: false,
            }
        }

        fn flaky() -> Self {
            Self {
                fail_every_other: true,
                ..Self::reliable()
            }
        }
    }

    #[async_trait]
    impl DeliverySink for CapturingStream {
        async fn put(
            &self,
            target: &str,
            _bytes: Vec<u8>,
            partition_key: &str,
        ) -> Result<String, SinkDeliveryError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_every_other && attempt % 2 == 1 {
                return Err(SinkDeliveryError::Throttled {
                    target: target.to_string(),
                    reason: "rate exceeded".to_string(),
                });
            }
            self.puts.lock().push((target.to_string(), partition_key.to_string()));
            Ok(format!("seq-{attempt}"))
        }
    }

    /// Sink behavior that forwards every consumed record downstream.
    struct StreamWriter {
        delivery: PartitionedDelivery,
    }

    #[async_trait]
    impl Consume for StreamWriter {
        async fn on_message(&mut self, message: Message) -> Result<(), NodeError> {
            self.delivery
                .deliver(&message)
                .await
                .map(|_| ())
                .map_err(|e| NodeError::callback(e.to_string()))
        }
    }

    fn writer_config(shards: u32) -> NodeConfig {
        let mut config = NodeConfig::named("kinesis-writer").subscribe_to("detections");
        config.partition = Some(PartitionConfig {
            mode: PartitionMode::SensorName,
            shards,
        });
        config
    }

    fn writer(config: &NodeConfig, stream: Arc<CapturingStream>) -> StreamWriter {
        let partition = config.partition.clone().unwrap_or_default();
        let router = PartitionRouter::from_config(&config.name, &partition)
            .expect("valid partition config");
        StreamWriter {
            delivery: PartitionedDelivery::new(stream, router, "traffic-stream"),
        }
    }

    async fn publish_counts(broker: Arc<InMemoryBroker>, sensors: &[&str]) {
        let publisher = TopicPublisher::new(broker, "detections", VehicleCount::TYPE_NAME);
        for (i, sensor) in sensors.iter().enumerate() {
            publisher
                .publish(&Message::new(
                    *sensor,
                    Box::new(VehicleCount {
                        lane: "northbound".to_string(),
                        vehicles: i as u32,
                    }),
                ))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_sink_node_delivers_with_rotating_partition_keys() {
        register_pipeline_types();
        let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new());
        let stream = Arc::new(CapturingStream::reliable());

        let config = writer_config(2);
        let behavior = NodeBehavior::Sink(Box::new(writer(&config, Arc::clone(&stream))));
        let engine = NodeEngine::new(config, broker.clone());
        let mut handle = engine.shutdown_handle();
        let task = tokio::spawn(engine.spin(behavior));
        wait_until(|| handle.state() == NodeState::Running).await;

        publish_counts(broker.clone(), &["cam-a", "cam-b", "cam-a", "cam-b"]).await;
        wait_until(|| stream.puts.lock().len() == 4).await;

        // Each sensor rotates through its own two key variants, in order.
        let keys: Vec<String> = stream.puts.lock().iter().map(|(_, k)| k.clone()).collect();
        assert_eq!(keys, vec!["cam-a-0", "cam-b-0", "cam-a-1", "cam-b-1"]);
        assert!(stream.puts.lock().iter().all(|(t, _)| t == "traffic-stream"));

        handle.request_shutdown();
        assert_eq!(handle.wait_terminal().await, NodeState::Stopped);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_delivery_failures_do_not_stop_the_sink() {
        register_pipeline_types();
        let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new());
        let stream = Arc::new(CapturingStream::flaky());

        let config = writer_config(1);
        let behavior = NodeBehavior::Sink(Box::new(writer(&config, Arc::clone(&stream))));
        let engine = NodeEngine::new(config, broker.clone());
        let mut handle = engine.shutdown_handle();
        let task = tokio::spawn(engine.spin(behavior));
        wait_until(|| handle.state() == NodeState::Running).await;

        publish_counts(broker.clone(), &["cam-a", "cam-a", "cam-a", "cam-a"]).await;
        wait_until(|| stream.attempts.load(Ordering::SeqCst) == 4).await;

        // Every other put was throttled; the node kept consuming regardless.
        assert_eq!(stream.puts.lock().len(), 2);
        assert_eq!(handle.state(), NodeState::Running);

        handle.request_shutdown();
        assert_eq!(handle.wait_terminal().await, NodeState::Stopped);
        task.await.unwrap().unwrap();
    }
}
