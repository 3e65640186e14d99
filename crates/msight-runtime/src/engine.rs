//! # Node Lifecycle Engine
//!
//! Drives one node behavior through the common lifecycle:
//!
//! ```text
//! Created → Initializing → Running → Draining → Stopped
//!                │             │
//!                └──── any ────┴──→ Errored (terminal)
//! ```
//!
//! The engine owns the loop, the state machine, the rate gate, and the
//! heartbeat emitter; the behavior supplies only its domain callbacks.
//! Single-message callback failures are logged and isolated - the offending
//! item is dropped and the loop continues. Configuration errors, failed
//! `initialize` hooks, and a ServerSource whose `serve` terminates early are
//! fatal and end the node in `Errored`.
//!
//! Terminal transitions always write a liveness record to the broker, even
//! when periodic heartbeats are disabled, so a crashed node stays visible in
//! the status report instead of silently vanishing.

use crate::error::NodeError;
use crate::heartbeat::{record_for, spawn_emitter};
use crate::node::{Consume, IncomingHandle, Process, Produce, Serve, ShutdownSignal};
use crate::rate::RateController;
use msight_bus::{Broker, TopicPublisher, TopicSubscription};
use msight_types::{ConfigError, Message, NodeConfig, NodeKind, NodeState, SensorData};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// How long a draining ServerSource waits for its `serve` hook to return
/// after `shutdown` has been invoked, before the task is aborted.
const SERVE_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A concrete node behavior, one variant per node kind.
pub enum NodeBehavior {
    /// Pull-based producer.
    Source(Box<dyn Produce>),
    /// Event-driven producer owning an external server.
    ServerSource(Box<dyn Serve>),
    /// Subscribe, transform, re-publish.
    Processor(Box<dyn Process>),
    /// Subscribe and consume.
    Sink(Box<dyn Consume>),
}

impl NodeBehavior {
    /// The node kind this behavior implements.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Source(_) => NodeKind::Source,
            Self::ServerSource(_) => NodeKind::ServerSource,
            Self::Processor(_) => NodeKind::Processor,
            Self::Sink(_) => NodeKind::Sink,
        }
    }
}

/// External control handle for a spinning node.
///
/// Cloneable and usable from any task: request shutdown, observe the current
/// lifecycle state, or await the terminal state.
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<watch::Sender<bool>>,
    state_rx: watch::Receiver<NodeState>,
}

impl ShutdownHandle {
    /// Ask the node to drain and stop. Idempotent.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// The node's current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        *self.state_rx.borrow()
    }

    /// Wait until the node reaches `Stopped` or `Errored`.
    pub async fn wait_terminal(&mut self) -> NodeState {
        loop {
            let state = *self.state_rx.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if self.state_rx.changed().await.is_err() {
                return *self.state_rx.borrow();
            }
        }
    }
}

/// The lifecycle engine for one node.
pub struct NodeEngine {
    config: NodeConfig,
    broker: Arc<dyn Broker>,
    state_tx: watch::Sender<NodeState>,
    shutdown: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl NodeEngine {
    /// Create an engine in the `Created` state.
    #[must_use]
    pub fn new(config: NodeConfig, broker: Arc<dyn Broker>) -> Self {
        let (state_tx, _) = watch::channel(NodeState::Created);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            broker,
            state_tx,
            shutdown: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// A control handle valid for this node's whole life.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: Arc::clone(&self.shutdown),
            state_rx: self.state_tx.subscribe(),
        }
    }

    /// The node's current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        *self.state_tx.borrow()
    }

    /// Run the node to completion.
    ///
    /// Validates the configuration against the behavior's kind, initializes,
    /// runs the kind-specific loop until shutdown is requested (or a fatal
    /// error occurs), drains, and invokes the behavior's shutdown hook. The
    /// final state is `Stopped` on success, `Errored` on any fatal error.
    pub async fn spin(self, behavior: NodeBehavior) -> Result<(), NodeError> {
        let kind = behavior.kind();
        if let Err(e) = self.config.validate(kind) {
            error!(node = %self.config.name, ?kind, error = %e, "Invalid node configuration");
            self.set_state(kind, NodeState::Errored);
            return Err(e.into());
        }

        info!(node = %self.config.name, ?kind, "Node starting");
        self.set_state(kind, NodeState::Initializing);

        let result = match behavior {
            NodeBehavior::Source(source) => self.run_source(kind, source).await,
            NodeBehavior::ServerSource(server) => self.run_server_source(kind, server).await,
            NodeBehavior::Processor(processor) => self.run_processor(kind, processor).await,
            NodeBehavior::Sink(sink) => self.run_sink(kind, sink).await,
        };

        match &result {
            Ok(()) => {
                self.set_state(kind, NodeState::Stopped);
                info!(node = %self.config.name, "Node stopped");
            }
            Err(e) => {
                self.set_state(kind, NodeState::Errored);
                error!(node = %self.config.name, error = %e, "Node terminated with fatal error");
            }
        }
        result
    }

    /// Publish the state transition and, where heartbeats apply, record it.
    fn set_state(&self, kind: NodeKind, state: NodeState) {
        self.state_tx.send_replace(state);
        if state.is_terminal() || self.config.heartbeat_tolerance.is_some() {
            self.broker
                .record_heartbeat(record_for(&self.config, kind, state));
        }
        debug!(node = %self.config.name, ?state, "State transition");
    }

    fn spawn_emitter_if_enabled(&self, kind: NodeKind) -> Option<JoinHandle<()>> {
        self.config.heartbeat_tolerance?;
        Some(spawn_emitter(
            Arc::clone(&self.broker),
            self.config.clone(),
            kind,
            self.state_tx.subscribe(),
        ))
    }

    fn publisher(&self, kind: NodeKind) -> Result<TopicPublisher, NodeError> {
        let topic = self
            .config
            .publish_topic
            .clone()
            .ok_or_else(|| ConfigError::MissingPublishTopic {
                node: self.config.name.clone(),
                kind,
            })?;
        let data_type = self
            .config
            .publish_data_type
            .clone()
            .ok_or_else(|| ConfigError::MissingPublishType {
                node: self.config.name.clone(),
                kind,
            })?;
        Ok(TopicPublisher::new(Arc::clone(&self.broker), topic, data_type))
    }

    fn subscription(&self, kind: NodeKind) -> Result<TopicSubscription, NodeError> {
        let topic = self
            .config
            .subscribe_topic
            .clone()
            .ok_or_else(|| ConfigError::MissingSubscribeTopic {
                node: self.config.name.clone(),
                kind,
            })?;
        Ok(TopicSubscription::new(self.broker.as_ref(), topic))
    }

    /// Provenance stamped on messages this node originates. Falls back to the
    /// incoming message's sensor (processors) or the node name (producers).
    fn outgoing_sensor(&self, incoming: Option<&str>) -> String {
        if !self.config.sensor_name.is_empty() {
            return self.config.sensor_name.clone();
        }
        match incoming {
            Some(sensor) => sensor.to_string(),
            None => self.config.name.clone(),
        }
    }

    /// Publish one payload; a failed publish drops the message and logs.
    async fn publish_payload(
        &self,
        publisher: &TopicPublisher,
        payload: Box<dyn SensorData>,
        incoming_sensor: Option<&str>,
    ) {
        let message = Message::new(self.outgoing_sensor(incoming_sensor), payload);
        if let Err(e) = publisher.publish(&message).await {
            warn!(
                node = %self.config.name,
                topic = %publisher.topic(),
                error = %e,
                "Publish failed, message dropped"
            );
        }
    }

    async fn run_source(&self, kind: NodeKind, mut source: Box<dyn Produce>) -> Result<(), NodeError> {
        source.initialize().await?;
        let publisher = self.publisher(kind)?;
        let rate = RateController::new(self.config.gap);

        self.set_state(kind, NodeState::Running);
        let _emitter = self.spawn_emitter_if_enabled(kind);

        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut ticker = if self.config.poll_interval.is_zero() {
            None
        } else {
            Some(tokio::time::interval(self.config.poll_interval))
        };

        while !*shutdown_rx.borrow() {
            if let Some(ticker) = ticker.as_mut() {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => continue,
                    _ = ticker.tick() => {}
                }
                if *shutdown_rx.borrow() {
                    break;
                }
            } else {
                // Free-running; yield so the rest of the runtime stays live.
                tokio::task::yield_now().await;
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            match source.produce().await {
                Ok(Some(payload)) => {
                    if rate.admit() {
                        self.publish_payload(&publisher, payload, None).await;
                    } else {
                        trace!(node = %self.config.name, "Item dropped by rate gate");
                    }
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(node = %self.config.name, error = %e, "Produce failed, item skipped");
                }
            }
        }

        self.set_state(kind, NodeState::Draining);
        if let Err(e) = source.shutdown().await {
            warn!(node = %self.config.name, error = %e, "Shutdown hook failed");
        }
        Ok(())
    }

    async fn run_processor(
        &self,
        kind: NodeKind,
        mut processor: Box<dyn Process>,
    ) -> Result<(), NodeError> {
        processor.initialize().await?;
        let mut subscription = self.subscription(kind)?;
        let publisher = self.publisher(kind)?;
        let rate = RateController::new(self.config.gap);

        self.set_state(kind, NodeState::Running);
        let _emitter = self.spawn_emitter_if_enabled(kind);

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                // Drain must win over a queued backlog.
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                maybe = subscription.recv_message() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    let Some(message) = maybe else {
                        warn!(node = %self.config.name, "Subscription closed, stopping");
                        break;
                    };
                    let incoming_sensor = message.envelope.sensor_name.clone();
                    match processor.process(message).await {
                        Ok(Some(payload)) => {
                            if rate.admit() {
                                self.publish_payload(&publisher, payload, Some(&incoming_sensor))
                                    .await;
                            } else {
                                trace!(node = %self.config.name, "Result dropped by rate gate");
                            }
                        }
                        Ok(None) => {
                            trace!(node = %self.config.name, "Publish suppressed by processor");
                        }
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            warn!(
                                node = %self.config.name,
                                sensor = %incoming_sensor,
                                error = %e,
                                "Process failed, message dropped"
                            );
                        }
                    }
                }
            }
        }

        self.set_state(kind, NodeState::Draining);
        if let Err(e) = processor.shutdown().await {
            warn!(node = %self.config.name, error = %e, "Shutdown hook failed");
        }
        Ok(())
    }

    async fn run_sink(&self, kind: NodeKind, mut sink: Box<dyn Consume>) -> Result<(), NodeError> {
        sink.initialize().await?;
        let mut subscription = self.subscription(kind)?;
        let rate = RateController::new(self.config.gap);

        self.set_state(kind, NodeState::Running);
        let _emitter = self.spawn_emitter_if_enabled(kind);

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                // Drain must win over a queued backlog.
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                maybe = subscription.recv_message() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    let Some(message) = maybe else {
                        warn!(node = %self.config.name, "Subscription closed, stopping");
                        break;
                    };
                    if !rate.admit() {
                        trace!(node = %self.config.name, "Message dropped by rate gate");
                        continue;
                    }
                    let sensor = message.envelope.sensor_name.clone();
                    match sink.on_message(message).await {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            warn!(
                                node = %self.config.name,
                                sensor = %sensor,
                                error = %e,
                                "Sink callback failed, message dropped"
                            );
                        }
                    }
                }
            }
        }

        self.set_state(kind, NodeState::Draining);
        if let Err(e) = sink.shutdown().await {
            warn!(node = %self.config.name, error = %e, "Shutdown hook failed");
        }
        Ok(())
    }

    async fn run_server_source(
        &self,
        kind: NodeKind,
        mut server: Box<dyn Serve>,
    ) -> Result<(), NodeError> {
        server.initialize().await?;
        let publisher = self.publisher(kind)?;

        // After initialize the server object is shared between its own serve
        // task and this dispatch loop.
        let server: Arc<dyn Serve> = Arc::from(server);
        let rate = Arc::new(RateController::new(self.config.gap));
        let (tx, mut rx) = mpsc::channel(self.config.buffer_size);
        let incoming = IncomingHandle::new(
            Arc::from(self.config.name.as_str()),
            Arc::clone(&rate),
            tx,
        );
        let signal = ShutdownSignal::new(self.shutdown_rx.clone());

        let mut serve_task = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.serve(incoming, signal).await }
        });

        self.set_state(kind, NodeState::Running);
        let _emitter = self.spawn_emitter_if_enabled(kind);

        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut serve_done = false;
        let mut rx_open = true;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                result = &mut serve_task, if !serve_done => {
                    serve_done = true;
                    let shutting_down = *shutdown_rx.borrow();
                    match result {
                        Ok(Ok(())) if shutting_down => break,
                        Ok(Ok(())) => {
                            return Err(NodeError::serve(format!(
                                "server loop for '{}' exited before shutdown",
                                self.config.name
                            )));
                        }
                        Ok(Err(e)) if shutting_down => {
                            warn!(node = %self.config.name, error = %e, "Serve hook failed during drain");
                            break;
                        }
                        Ok(Err(e)) => return Err(NodeError::serve(e.to_string())),
                        Err(e) => {
                            return Err(NodeError::serve(format!("server task panicked: {e}")));
                        }
                    }
                }
                raw = rx.recv(), if rx_open => {
                    match raw {
                        Some(raw) => self.dispatch_incoming(server.as_ref(), raw, &publisher).await,
                        // Serve dropped its handle; the serve-task arm decides
                        // whether that is fatal.
                        None => rx_open = false,
                    }
                }
            }
        }

        self.set_state(kind, NodeState::Draining);
        if let Err(e) = server.shutdown().await {
            warn!(node = %self.config.name, error = %e, "Shutdown hook failed");
        }

        // Finish units the gate already admitted.
        while let Ok(raw) = rx.try_recv() {
            self.dispatch_incoming(server.as_ref(), raw, &publisher).await;
        }

        if !serve_done {
            match tokio::time::timeout(SERVE_SHUTDOWN_GRACE, &mut serve_task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    warn!(node = %self.config.name, error = %e, "Serve hook failed during drain");
                }
                Ok(Err(e)) => {
                    warn!(node = %self.config.name, error = %e, "Server task panicked during drain");
                }
                Err(_) => {
                    warn!(node = %self.config.name, "Serve hook ignored shutdown, aborting task");
                    serve_task.abort();
                }
            }
        }
        Ok(())
    }

    /// Decode-and-publish for one externally-arrived raw unit. The rate gate
    /// already ran in [`IncomingHandle::handle_incoming`].
    async fn dispatch_incoming(&self, server: &dyn Serve, raw: Vec<u8>, publisher: &TopicPublisher) {
        match server.on_incoming(raw) {
            Ok(Some(payload)) => self.publish_payload(publisher, payload, None).await,
            Ok(None) => {}
            Err(e) => {
                warn!(node = %self.config.name, error = %e, "Incoming unit dropped by failing callback");
            }
        }
    }
}
