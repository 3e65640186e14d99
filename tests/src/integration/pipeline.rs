//! # Pipeline Choreography
//!
//! Full Source → Processor → Sink flows wired through the in-memory broker:
//! typed publish/subscribe, gap-based subsampling at the producing edge,
//! concurrent ServerSource ingestion, and decode-failure isolation on a
//! shared topic.

#[cfg(test)]
mod tests {
    use crate::integration::{
        register_pipeline_types, wait_until, CollectingSink, FrameSource, VehicleCount,
    };
    use async_trait::async_trait;
    use msight_bus::{Broker, InMemoryBroker, TopicPublisher};
    use msight_runtime::{
        IncomingHandle, NodeBehavior, NodeEngine, NodeError, Process, Serve, ShutdownHandle,
        ShutdownSignal,
    };
    use msight_types::{BytesData, ImageData, Message, NodeConfig, NodeState, SensorData};
    use parking_lot::Mutex;
    use rand::Rng;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Turns one frame into a per-lane vehicle count.
    struct Detector;

    #[async_trait]
    impl Process for Detector {
        async fn process(
            &mut self,
            message: Message,
        ) -> Result<Option<Box<dyn SensorData>>, NodeError> {
            let frame = message
                .payload_as::<ImageData>()
                .ok_or_else(|| NodeError::callback("expected an image frame"))?;
            Ok(Some(Box::new(VehicleCount {
                lane: "northbound".to_string(),
                vehicles: u32::from(frame.data[0]),
            })))
        }
    }

    async fn wait_running(handle: &ShutdownHandle) {
        wait_until(|| handle.state() == NodeState::Running).await;
    }

    fn source_config(gap: u32) -> NodeConfig {
        NodeConfig::named("camera-01")
            .with_sensor("rtsp-cam-01")
            .publish_to("frames")
            .with_publish_type(ImageData::TYPE_NAME)
            .with_gap(gap)
    }

    fn detector_config() -> NodeConfig {
        NodeConfig::named("detector")
            .subscribe_to("frames")
            .publish_to("counts")
            .with_publish_type(VehicleCount::TYPE_NAME)
    }

    #[tokio::test]
    async fn test_source_processor_sink_pipeline() {
        register_pipeline_types();
        let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new());

        // Consumers first so no message is published into the void.
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_engine = NodeEngine::new(
            NodeConfig::named("count-writer").subscribe_to("counts"),
            broker.clone(),
        );
        let sink_handle = sink_engine.shutdown_handle();
        let sink_task = tokio::spawn(sink_engine.spin(NodeBehavior::Sink(Box::new(
            CollectingSink {
                seen: Arc::clone(&seen),
            },
        ))));

        let proc_engine = NodeEngine::new(detector_config(), broker.clone());
        let proc_handle = proc_engine.shutdown_handle();
        let proc_task = tokio::spawn(proc_engine.spin(NodeBehavior::Processor(Box::new(Detector))));

        wait_running(&sink_handle).await;
        wait_running(&proc_handle).await;

        let src_engine = NodeEngine::new(source_config(0), broker.clone());
        let src_handle = src_engine.shutdown_handle();
        let src_task = tokio::spawn(
            src_engine.spin(NodeBehavior::Source(Box::new(FrameSource::with_limit(6)))),
        );

        wait_until(|| seen.lock().len() == 6).await;

        // Downstream of the detector every message is a typed count, and the
        // detector (which sets no sensor of its own) propagates provenance.
        {
            let seen = seen.lock();
            for (i, message) in seen.iter().enumerate() {
                assert_eq!(message.envelope.type_name, VehicleCount::TYPE_NAME);
                assert_eq!(message.envelope.sensor_name, "rtsp-cam-01");
                let count = message.payload_as::<VehicleCount>().unwrap();
                assert_eq!(count.vehicles, i as u32);
                assert_eq!(count.lane, "northbound");
            }
        }

        // Drain upstream-first so nothing is lost mid-flight.
        for (handle, task) in [
            (src_handle, src_task),
            (proc_handle, proc_task),
            (sink_handle, sink_task),
        ] {
            let mut handle = handle;
            handle.request_shutdown();
            assert_eq!(handle.wait_terminal().await, NodeState::Stopped);
            task.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_source_gap_subsamples_before_publish() {
        register_pipeline_types();
        let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_engine = NodeEngine::new(
            NodeConfig::named("frame-writer").subscribe_to("frames"),
            broker.clone(),
        );
        let sink_handle = sink_engine.shutdown_handle();
        let sink_task = tokio::spawn(sink_engine.spin(NodeBehavior::Sink(Box::new(
            CollectingSink {
                seen: Arc::clone(&seen),
            },
        ))));
        wait_running(&sink_handle).await;

        // Gap 2: frames 0, 3, 6 of 9 pass the gate.
        let src_engine = NodeEngine::new(source_config(2), broker.clone());
        let src_handle = src_engine.shutdown_handle();
        let src_task = tokio::spawn(
            src_engine.spin(NodeBehavior::Source(Box::new(FrameSource::with_limit(9)))),
        );

        wait_until(|| seen.lock().len() == 3).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let frames: Vec<u8> = seen
            .lock()
            .iter()
            .map(|m| m.payload_as::<ImageData>().unwrap().data[0])
            .collect();
        assert_eq!(frames, vec![0, 3, 6]);

        for (handle, task) in [(src_handle, src_task), (sink_handle, sink_task)] {
            let mut handle = handle;
            handle.request_shutdown();
            assert_eq!(handle.wait_terminal().await, NodeState::Stopped);
            task.await.unwrap().unwrap();
        }
    }

    /// Publishes its [`IncomingHandle`] to the test, then blocks on shutdown.
    struct HandleSharingServer {
        slot: Arc<Mutex<Option<IncomingHandle>>>,
    }

    #[async_trait]
    impl Serve for HandleSharingServer {
        async fn serve(
            &self,
            incoming: IncomingHandle,
            mut shutdown: ShutdownSignal,
        ) -> Result<(), NodeError> {
            *self.slot.lock() = Some(incoming);
            shutdown.wait().await;
            Ok(())
        }

        fn on_incoming(&self, raw: Vec<u8>) -> Result<Option<Box<dyn SensorData>>, NodeError> {
            Ok(Some(Box::new(BytesData::new(raw))))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_server_source_ingests_from_concurrent_threads() {
        register_pipeline_types();
        let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new());

        let consumed = Arc::new(AtomicU32::new(0));
        let counter_sink = {
            struct Counting {
                consumed: Arc<AtomicU32>,
            }
            #[async_trait]
            impl msight_runtime::Consume for Counting {
                async fn on_message(&mut self, _message: Message) -> Result<(), NodeError> {
                    self.consumed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
            Counting {
                consumed: Arc::clone(&consumed),
            }
        };
        let sink_engine = NodeEngine::new(
            NodeConfig::named("packet-writer").subscribe_to("packets"),
            broker.clone(),
        );
        let sink_handle = sink_engine.shutdown_handle();
        let sink_task = tokio::spawn(sink_engine.spin(NodeBehavior::Sink(Box::new(counter_sink))));
        wait_running(&sink_handle).await;

        let mut server_config = NodeConfig::server_source_defaults("udp-in")
            .with_sensor("udp-in")
            .publish_to("packets")
            .with_publish_type(BytesData::TYPE_NAME);
        server_config.buffer_size = 2048;
        let slot = Arc::new(Mutex::new(None));
        let server_engine = NodeEngine::new(server_config, broker.clone());
        let server_handle = server_engine.shutdown_handle();
        let server_task = tokio::spawn(server_engine.spin(NodeBehavior::ServerSource(Box::new(
            HandleSharingServer {
                slot: Arc::clone(&slot),
            },
        ))));

        wait_until(|| slot.lock().is_some()).await;
        let incoming = slot.lock().clone().unwrap();

        // Eight external worker threads hammer the one thread-safe entry point.
        let mut workers = Vec::new();
        for worker in 0..8u8 {
            let incoming = incoming.clone();
            workers.push(std::thread::spawn(move || {
                for i in 0..125u8 {
                    incoming.handle_incoming(vec![worker, i]);
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(incoming.considered(), 1000);

        wait_until(|| consumed.load(Ordering::SeqCst) == 1000).await;

        for (handle, task) in [(server_handle, server_task), (sink_handle, sink_task)] {
            let mut handle = handle;
            handle.request_shutdown();
            assert_eq!(handle.wait_terminal().await, NodeState::Stopped);
            task.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_undecodable_bytes_do_not_poison_a_topic() {
        register_pipeline_types();
        let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_engine = NodeEngine::new(
            NodeConfig::named("count-writer").subscribe_to("counts"),
            broker.clone(),
        );
        let sink_handle = sink_engine.shutdown_handle();
        let sink_task = tokio::spawn(sink_engine.spin(NodeBehavior::Sink(Box::new(
            CollectingSink {
                seen: Arc::clone(&seen),
            },
        ))));
        wait_running(&sink_handle).await;

        // Noise straight onto the wire, then a structurally valid envelope
        // with a tag nobody registered, then a well-formed message.
        let noise: Vec<u8> = (0..16).map(|_| rand::thread_rng().gen()).collect();
        broker.publish("counts", noise).await.unwrap();
        let unknown = bincode::serialize(&(
            "mystery_type".to_string(),
            "cam".to_string(),
            0u64,
            0u64,
            vec![1u8, 2, 3],
        ))
        .unwrap();
        broker.publish("counts", unknown).await.unwrap();

        let publisher = TopicPublisher::new(broker.clone(), "counts", VehicleCount::TYPE_NAME);
        publisher
            .publish(&Message::new(
                "rtsp-cam-01",
                Box::new(VehicleCount {
                    lane: "southbound".to_string(),
                    vehicles: 3,
                }),
            ))
            .await
            .unwrap();

        wait_until(|| seen.lock().len() == 1).await;
        let seen = seen.lock();
        assert_eq!(seen[0].payload_as::<VehicleCount>().unwrap().vehicles, 3);

        let mut handle = sink_handle;
        handle.request_shutdown();
        assert_eq!(handle.wait_terminal().await, NodeState::Stopped);
        sink_task.await.unwrap().unwrap();
    }
}
