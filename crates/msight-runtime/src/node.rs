//! # Node Behaviors
//!
//! The capability traits a concrete node implements, one per kind. The
//! engine forces no unrelated hooks on a kind: a Sink only writes
//! `on_message`, a Source only `produce`.
//!
//! All hooks except the ServerSource pair run on the engine's single task,
//! one callback at a time - implementations need not be reentrant-safe.
//! [`IncomingHandle::handle_incoming`] is the one entry point that may be
//! invoked concurrently from external worker threads.

use crate::error::NodeError;
use crate::rate::RateController;
use async_trait::async_trait;
use msight_types::{Message, SensorData};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

/// Pull-based producer: the engine periodically asks for one item.
///
/// `produce` may block briefly to acquire the next item (decode one frame,
/// read one record); returning `Ok(None)` means "nothing this tick".
#[async_trait]
pub trait Produce: Send {
    /// Acquire resources (decoders, sockets, files).
    async fn initialize(&mut self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Produce one item.
    async fn produce(&mut self) -> Result<Option<Box<dyn SensorData>>, NodeError>;

    /// Release resources acquired in `initialize`.
    async fn shutdown(&mut self) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Event-driven producer owning an external server.
///
/// `serve` runs once and is expected to block (async) for the node's entire
/// running lifetime, routing each externally-arrived raw unit into the
/// [`IncomingHandle`] it receives. Because the server's worker threads share
/// this object with the engine's dispatch loop, the hooks other than
/// `initialize` take `&self`: implementations hold their mutable server
/// state behind internal synchronization.
#[async_trait]
pub trait Serve: Send + Sync {
    /// Set up the server object. Runs before any sharing, hence `&mut`.
    async fn initialize(&mut self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Run the server loop until `shutdown` fires.
    ///
    /// Returning early (even `Ok`) while the node is not shutting down is a
    /// fatal serve failure: no further input can arrive.
    async fn serve(
        &self,
        incoming: IncomingHandle,
        shutdown: ShutdownSignal,
    ) -> Result<(), NodeError>;

    /// Convert one raw unit into a payload; `Ok(None)` drops it silently.
    ///
    /// Runs on the engine's dispatch task, one unit at a time.
    fn on_incoming(&self, raw: Vec<u8>) -> Result<Option<Box<dyn SensorData>>, NodeError>;

    /// Stop the user-owned server so `serve` can return, then release
    /// resources.
    async fn shutdown(&self) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Transforming consumer: subscribe, process, re-publish.
#[async_trait]
pub trait Process: Send {
    /// Acquire resources.
    async fn initialize(&mut self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Process one message; `Ok(None)` suppresses publishing.
    async fn process(&mut self, message: Message)
        -> Result<Option<Box<dyn SensorData>>, NodeError>;

    /// Release resources.
    async fn shutdown(&mut self) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Terminal consumer: subscribe only.
#[async_trait]
pub trait Consume: Send {
    /// Acquire resources.
    async fn initialize(&mut self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Handle one message.
    async fn on_message(&mut self, message: Message) -> Result<(), NodeError>;

    /// Release resources.
    async fn shutdown(&mut self) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Thread-safe entry point for externally-arrived raw units.
///
/// This is the one concurrency boundary in the runtime: server worker
/// threads may call [`Self::handle_incoming`] simultaneously. The rate gate
/// increments exactly once per call; admitted units are handed to the
/// engine's single-threaded dispatch loop over a bounded channel.
#[derive(Clone)]
pub struct IncomingHandle {
    node: Arc<str>,
    rate: Arc<RateController>,
    tx: mpsc::Sender<Vec<u8>>,
}

impl IncomingHandle {
    pub(crate) fn new(node: Arc<str>, rate: Arc<RateController>, tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self { node, rate, tx }
    }

    /// Hand one raw unit to the node.
    ///
    /// Returns whether the unit was accepted for dispatch. Units dropped by
    /// the rate gate or by a full hand-off buffer are not errors; buffer
    /// overflow is logged since it loses data the gate admitted.
    ///
    /// Callable from any thread; never blocks.
    pub fn handle_incoming(&self, raw: Vec<u8>) -> bool {
        if !self.rate.admit() {
            trace!(node = %self.node, "Rate gate dropped incoming unit");
            return false;
        }
        match self.tx.try_send(raw) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(node = %self.node, "Hand-off buffer full, incoming unit dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(node = %self.node, "Node draining, incoming unit dropped");
                false
            }
        }
    }

    /// Items considered by the rate gate so far.
    pub fn considered(&self) -> u64 {
        self.rate.considered()
    }
}

/// Read side of the node's shutdown request.
///
/// Cloneable; `serve` implementations poll or await it to know when to stop.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Engine dropped; treat as shutdown.
                return;
            }
        }
    }
}
