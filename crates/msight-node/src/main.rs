//! # MSight Demo Node
//!
//! A single-process reference pipeline on the MSight runtime:
//!
//! ```text
//! traffic-camera ──frames──→ vehicle-detector ──detections──→ detection-report
//!   (Source)                   (Processor)                      (Sink)
//! ```
//!
//! The camera is synthetic (random frames at 10 Hz, subsampled by the rate
//! gate), the detector counts bright pixels as "vehicles", and the sink logs
//! each summary. A background task prints the liveness status report every
//! ten seconds. `Ctrl-C` drains the pipeline upstream-first.
//!
//! Deployments assemble real pipelines the same way: register payload types,
//! build one engine per node, spin them, and keep the shutdown handles.

use anyhow::{Context, Result};
use async_trait::async_trait;
use msight_bus::{Broker, InMemoryBroker};
use msight_runtime::{
    status_report_json, Consume, NodeBehavior, NodeEngine, NodeError, Process, Produce,
    ShutdownHandle,
};
use msight_telemetry::{init_telemetry, TelemetryConfig};
use msight_types::envelope::wall_clock_ms;
use msight_types::{
    data::encode_body, register_builtin_types, registry, CodecError, ImageData, Message,
    NodeConfig, SensorData,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

const FRAMES_TOPIC: &str = "frames";
const DETECTIONS_TOPIC: &str = "detections";

/// Per-frame detection result emitted by the detector stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DetectionSummary {
    frame: u64,
    vehicles: u32,
}

impl DetectionSummary {
    const TYPE_NAME: &'static str = "detection_summary";
}

impl SensorData for DetectionSummary {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn encode_payload(&self) -> Result<Vec<u8>, CodecError> {
        encode_body(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Synthetic 8x8 grayscale camera.
struct SyntheticCamera {
    frame: u64,
}

#[async_trait]
impl Produce for SyntheticCamera {
    async fn produce(&mut self) -> Result<Option<Box<dyn SensorData>>, NodeError> {
        self.frame += 1;
        let data: Vec<u8> = (0..64).map(|_| rand::thread_rng().gen()).collect();
        Ok(Some(Box::new(ImageData {
            width: 8,
            height: 8,
            pixel_format: "gray8".to_string(),
            data,
        })))
    }
}

/// Counts bright pixels as vehicles.
struct VehicleDetector {
    frames_seen: u64,
}

#[async_trait]
impl Process for VehicleDetector {
    async fn process(&mut self, message: Message) -> Result<Option<Box<dyn SensorData>>, NodeError> {
        let frame = message
            .payload_as::<ImageData>()
            .ok_or_else(|| NodeError::callback("expected an image frame"))?;
        self.frames_seen += 1;
        let vehicles = frame.data.iter().filter(|&&px| px > 200).count() as u32;
        Ok(Some(Box::new(DetectionSummary {
            frame: self.frames_seen,
            vehicles,
        })))
    }
}

/// Logs every detection summary.
struct DetectionReport;

#[async_trait]
impl Consume for DetectionReport {
    async fn on_message(&mut self, message: Message) -> Result<(), NodeError> {
        let summary = message
            .payload_as::<DetectionSummary>()
            .ok_or_else(|| NodeError::callback("expected a detection summary"))?;
        info!(
            sensor = %message.envelope.sensor_name,
            frame = summary.frame,
            vehicles = summary.vehicles,
            "Detection summary"
        );
        Ok(())
    }
}

type NodeTask = JoinHandle<Result<(), NodeError>>;

fn spawn_node(
    broker: &Arc<InMemoryBroker>,
    config: NodeConfig,
    behavior: NodeBehavior,
) -> (ShutdownHandle, NodeTask) {
    let engine = NodeEngine::new(config, broker.clone() as Arc<dyn Broker>);
    let handle = engine.shutdown_handle();
    (handle, tokio::spawn(engine.spin(behavior)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard =
        init_telemetry(TelemetryConfig::from_env()).context("failed to initialize telemetry")?;
    register_builtin_types().context("builtin payload registration")?;
    registry::register_payload::<DetectionSummary>(DetectionSummary::TYPE_NAME)
        .context("detection summary registration")?;

    let broker = Arc::new(InMemoryBroker::new());

    // Consumers first so no frame is published into the void.
    let (sink_handle, sink_task) = spawn_node(
        &broker,
        NodeConfig::named("detection-report").subscribe_to(DETECTIONS_TOPIC),
        NodeBehavior::Sink(Box::new(DetectionReport)),
    );
    let (detector_handle, detector_task) = spawn_node(
        &broker,
        NodeConfig::named("vehicle-detector")
            .subscribe_to(FRAMES_TOPIC)
            .publish_to(DETECTIONS_TOPIC)
            .with_publish_type(DetectionSummary::TYPE_NAME),
        NodeBehavior::Processor(Box::new(VehicleDetector { frames_seen: 0 })),
    );

    let mut camera_config = NodeConfig::named("traffic-camera")
        .with_sensor("synthetic-cam-01")
        .publish_to(FRAMES_TOPIC)
        .with_publish_type(ImageData::TYPE_NAME)
        .with_gap(4); // 10 Hz capture, 2 Hz published
    camera_config.poll_interval = Duration::from_millis(100);
    let (camera_handle, camera_task) = spawn_node(
        &broker,
        camera_config,
        NodeBehavior::Source(Box::new(SyntheticCamera { frame: 0 })),
    );

    let status_task = tokio::spawn({
        let broker = Arc::clone(&broker);
        async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(10));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = status_report_json(broker.as_ref(), wall_clock_ms());
                let rendered = serde_json::to_string_pretty(&report)
                    .unwrap_or_else(|_| report.to_string());
                info!(report = %rendered, "Pipeline status");
            }
        }
    });

    info!("Pipeline running, Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested, draining pipeline");
    status_task.abort();

    // Upstream-first so in-flight data reaches the sink before it stops.
    let nodes = [
        ("traffic-camera", camera_handle, camera_task),
        ("vehicle-detector", detector_handle, detector_task),
        ("detection-report", sink_handle, sink_task),
    ];
    for (name, mut handle, task) in nodes {
        handle.request_shutdown();
        let state = handle.wait_terminal().await;
        match task.await {
            Ok(Ok(())) => info!(node = name, ?state, "Node stopped"),
            Ok(Err(e)) => error!(node = name, error = %e, "Node ended with error"),
            Err(e) => error!(node = name, error = %e, "Node task panicked"),
        }
    }
    Ok(())
}
