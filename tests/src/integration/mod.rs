//! # Integration Tests
//!
//! Cross-crate choreography over the in-memory broker, plus the shared
//! fixtures the individual test modules build their pipelines from.

pub mod delivery;
pub mod liveness;
pub mod pipeline;

use async_trait::async_trait;
use msight_runtime::{Consume, NodeError, Produce};
use msight_telemetry::TelemetryConfig;
use msight_types::{registry, CodecError, ImageData, Message, SensorData};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Best-effort logging for test runs; losing the init race is fine.
pub fn init_test_logging() {
    let _ = msight_telemetry::init_telemetry(TelemetryConfig::default());
}

/// Per-lane vehicle count, the payload the detection stage emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleCount {
    pub lane: String,
    pub vehicles: u32,
}

impl VehicleCount {
    pub const TYPE_NAME: &'static str = "vehicle_count";
}

impl SensorData for VehicleCount {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn encode_payload(&self) -> Result<Vec<u8>, CodecError> {
        msight_types::data::encode_body(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Register every payload type the pipeline tests decode.
pub fn register_pipeline_types() {
    init_test_logging();
    msight_types::register_builtin_types().expect("builtin registration");
    registry::register_payload::<VehicleCount>(VehicleCount::TYPE_NAME)
        .expect("vehicle_count registration");
}

/// Produces `limit` single-pixel frames whose first byte is the frame index,
/// then idles.
pub struct FrameSource {
    pub produced: u32,
    pub limit: u32,
}

impl FrameSource {
    pub fn with_limit(limit: u32) -> Self {
        Self { produced: 0, limit }
    }
}

#[async_trait]
impl Produce for FrameSource {
    async fn produce(&mut self) -> Result<Option<Box<dyn SensorData>>, NodeError> {
        if self.produced >= self.limit {
            return Ok(None);
        }
        let n = self.produced;
        self.produced += 1;
        Ok(Some(Box::new(ImageData {
            width: 1,
            height: 1,
            pixel_format: "rgb8".to_string(),
            data: vec![n as u8, 0, 0],
        })))
    }
}

/// Collects every consumed message for later assertions.
pub struct CollectingSink {
    pub seen: Arc<Mutex<Vec<Message>>>,
}

#[async_trait]
impl Consume for CollectingSink {
    async fn on_message(&mut self, message: Message) -> Result<(), NodeError> {
        self.seen.lock().push(message);
        Ok(())
    }
}

/// Poll `cond` until it holds, failing the test after five seconds.
pub async fn wait_until<F: Fn() -> bool>(cond: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
