//! # Liveness and Status Reporting
//!
//! Heartbeat emission from spinning nodes and the central status query:
//! alive/stale classification against per-node tolerances, and the guarantee
//! that terminally-failed nodes stay visible in the report.

#[cfg(test)]
mod tests {
    use crate::integration::{register_pipeline_types, wait_until, FrameSource};
    use msight_bus::{Broker, InMemoryBroker};
    use msight_runtime::{status_report, status_report_json, Liveness, NodeBehavior, NodeEngine};
    use msight_types::envelope::wall_clock_ms;
    use msight_types::{ImageData, NodeConfig, NodeKind, NodeState};
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn camera_config(name: &str) -> NodeConfig {
        let mut config = NodeConfig::named(name)
            .with_sensor("rtsp-cam-01")
            .publish_to("frames")
            .with_publish_type(ImageData::TYPE_NAME);
        config.heartbeat_interval = Duration::from_millis(10);
        config.heartbeat_tolerance = Some(Duration::from_millis(500));
        config
    }

    #[tokio::test]
    async fn test_running_node_reports_alive_then_stopped() {
        register_pipeline_types();
        let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new());

        let engine = NodeEngine::new(camera_config("camera-01"), broker.clone());
        let mut handle = engine.shutdown_handle();
        let task = tokio::spawn(
            engine.spin(NodeBehavior::Source(Box::new(FrameSource::with_limit(0)))),
        );

        wait_until(|| {
            status_report(broker.as_ref(), wall_clock_ms())
                .iter()
                .any(|s| s.node == "camera-01" && s.state == NodeState::Running)
        })
        .await;

        let report = status_report(broker.as_ref(), wall_clock_ms());
        let status = &report[0];
        assert_eq!(status.kind, NodeKind::Source);
        assert_eq!(status.publish_topic.as_deref(), Some("frames"));
        assert_eq!(status.liveness, Liveness::Alive);

        handle.request_shutdown();
        assert_eq!(handle.wait_terminal().await, NodeState::Stopped);
        task.await.unwrap().unwrap();

        let report = status_report(broker.as_ref(), wall_clock_ms());
        assert_eq!(report[0].liveness, Liveness::Stopped);
    }

    #[tokio::test]
    async fn test_silent_node_classified_stale() {
        register_pipeline_types();
        let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new());

        let engine = NodeEngine::new(camera_config("camera-02"), broker.clone());
        let mut handle = engine.shutdown_handle();
        let task = tokio::spawn(
            engine.spin(NodeBehavior::Source(Box::new(FrameSource::with_limit(0)))),
        );
        wait_until(|| !broker.heartbeat_snapshot().is_empty()).await;

        // Same records, queried from a vantage point past the tolerance.
        let report = status_report(broker.as_ref(), wall_clock_ms() + 10_000);
        assert_eq!(report[0].liveness, Liveness::Stale);

        // And a fresh query is alive again.
        wait_until(|| {
            status_report(broker.as_ref(), wall_clock_ms())[0].liveness == Liveness::Alive
        })
        .await;

        handle.request_shutdown();
        handle.wait_terminal().await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_startup_is_visible_as_errored() {
        register_pipeline_types();
        let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new());

        // A sink with no subscribe topic never reaches Running.
        let engine = NodeEngine::new(NodeConfig::named("broken-writer"), broker.clone());
        let result = engine
            .spin(NodeBehavior::Sink(Box::new(
                crate::integration::CollectingSink {
                    seen: Arc::new(parking_lot::Mutex::new(Vec::new())),
                },
            )))
            .await;
        assert!(result.is_err());

        let report = status_report(broker.as_ref(), wall_clock_ms());
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].node, "broken-writer");
        assert_eq!(report[0].state, NodeState::Errored);
        assert_eq!(report[0].liveness, Liveness::Errored);
    }

    #[tokio::test]
    async fn test_disabled_heartbeats_still_record_terminal_state() {
        register_pipeline_types();
        let broker: Arc<InMemoryBroker> = Arc::new(InMemoryBroker::new());

        let name = format!("camera-{}", Uuid::new_v4());
        let mut config = camera_config(&name);
        config.heartbeat_tolerance = None;

        let engine = NodeEngine::new(config, broker.clone());
        let mut handle = engine.shutdown_handle();
        let task = tokio::spawn(
            engine.spin(NodeBehavior::Source(Box::new(FrameSource::with_limit(0)))),
        );

        handle.request_shutdown();
        assert_eq!(handle.wait_terminal().await, NodeState::Stopped);
        task.await.unwrap().unwrap();

        // No periodic records were ever written, only the terminal one.
        let records = broker.heartbeat_snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, NodeState::Stopped);

        let json = status_report_json(broker.as_ref(), wall_clock_ms());
        assert_eq!(json[0]["node"], name.as_str());
        assert_eq!(json[0]["liveness"], "Stopped");
    }
}
