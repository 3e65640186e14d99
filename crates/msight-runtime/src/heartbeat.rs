//! # Heartbeat Monitor
//!
//! Periodic liveness emission per node plus the central status query.
//!
//! The emitter runs on its own async task, independent of the node's main
//! loop - so a ServerSource whose `serve` blocks can still emit when
//! heartbeats are enabled for it. Terminal transitions always write a final
//! record (even with heartbeats disabled), keeping failed nodes visible as
//! `Errored` instead of merely absent.

use msight_bus::{Broker, HeartbeatRecord};
use msight_types::{NodeConfig, NodeKind, NodeState};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Liveness classification for one node, from the status query's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Liveness {
    /// Heard from within its tolerance (or heartbeats disabled).
    Alive,
    /// Silent longer than its tolerance.
    Stale,
    /// Exited cleanly.
    Stopped,
    /// Terminated by a fatal error.
    Errored,
}

/// One row of the status report.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    /// Node name.
    pub node: String,
    /// Node role.
    pub kind: NodeKind,
    /// Declared publish topic.
    pub publish_topic: Option<String>,
    /// Declared subscribe topic.
    pub subscribe_topic: Option<String>,
    /// Last reported lifecycle state.
    pub state: NodeState,
    /// Wall-clock time of the last heartbeat, ms since epoch.
    pub last_heartbeat_ms: u64,
    /// Classification at query time.
    pub liveness: Liveness,
}

/// Classify every currently-known node, sorted by name.
///
/// Uses each record's own tolerance: `Alive` iff
/// `now - last_heartbeat <= tolerance`. Records without a tolerance
/// (heartbeats disabled for that node) are never classified stale.
pub fn status_report(broker: &dyn Broker, now_ms: u64) -> Vec<NodeStatus> {
    let mut statuses: Vec<NodeStatus> = broker
        .heartbeat_snapshot()
        .into_iter()
        .map(|record| {
            let liveness = classify(&record, now_ms);
            NodeStatus {
                node: record.node,
                kind: record.kind,
                publish_topic: record.publish_topic,
                subscribe_topic: record.subscribe_topic,
                state: record.state,
                last_heartbeat_ms: record.timestamp_ms,
                liveness,
            }
        })
        .collect();
    statuses.sort_by(|a, b| a.node.cmp(&b.node));
    statuses
}

/// The status report as a JSON document.
pub fn status_report_json(broker: &dyn Broker, now_ms: u64) -> serde_json::Value {
    serde_json::to_value(status_report(broker, now_ms)).unwrap_or_default()
}

fn classify(record: &HeartbeatRecord, now_ms: u64) -> Liveness {
    match record.state {
        NodeState::Errored => Liveness::Errored,
        NodeState::Stopped => Liveness::Stopped,
        _ => match record.tolerance_ms {
            Some(tolerance) if now_ms.saturating_sub(record.timestamp_ms) > tolerance => {
                Liveness::Stale
            }
            _ => Liveness::Alive,
        },
    }
}

/// Build the liveness record for a node in a given state, stamped now.
pub(crate) fn record_for(config: &NodeConfig, kind: NodeKind, state: NodeState) -> HeartbeatRecord {
    let mut record = HeartbeatRecord::new(config.name.clone(), kind)
        .with_topics(config.publish_topic.clone(), config.subscribe_topic.clone())
        .in_state(state);
    if let Some(tolerance) = config.heartbeat_tolerance {
        record = record.with_tolerance_ms(tolerance.as_millis() as u64);
    }
    record
}

/// Spawn the periodic emitter for a Running node.
///
/// Emits every `heartbeat_interval` until the node reaches a terminal state
/// (the engine writes the final terminal record itself).
pub(crate) fn spawn_emitter(
    broker: Arc<dyn Broker>,
    config: NodeConfig,
    kind: NodeKind,
    mut state_rx: watch::Receiver<NodeState>,
) -> JoinHandle<()> {
    let interval = config.heartbeat_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        // The immediate first tick registers the node as soon as it runs.
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let state = *state_rx.borrow();
                    if state.is_terminal() {
                        break;
                    }
                    broker.record_heartbeat(record_for(&config, kind, state));
                    debug!(node = %config.name, ?state, "Heartbeat emitted");
                }
                changed = state_rx.changed() => {
                    if changed.is_err() || state_rx.borrow().is_terminal() {
                        break;
                    }
                }
            }
        }
    })
}
