//! # Messaging Dispatcher
//!
//! The explicitly owned context through which distributed objects register
//! handlers and send messages to objects on other ranks.
//!
//! ## Send Path
//!
//! `send_to` frames `[handle][payload]` and hands it to the transport. It
//! returns once the frame is handed off; delivery is asynchronous and
//! unacknowledged. With `local_short_circuit` enabled, messages to the local
//! rank skip the transport and go through an in-process queue drained by the
//! delivery loop, so handlers still run on the delivery task and self-sends
//! keep their order.
//!
//! ## Receive Path
//!
//! `start` spawns the delivery loop on the current tokio runtime. Transports
//! that push frames through a callback instead can call [`Dispatcher::deliver`]
//! directly.
//!
//! ## Request/Response
//!
//! There is no session state. A request and its reply are two one-shot
//! messages correlated by an id the caller puts in the payload.

use crate::config::MessagingConfig;
use crate::delivery::{DeliveryLoop, LocalReceiver};
use crate::error::{MessagingError, Result};
use crate::frame;
use crate::handle::ObjectHandle;
use crate::handler::MessageHandler;
use crate::registration::Registration;
use crate::registry::{HandlerRegistry, Registered};
use crate::router::{DeliveryOutcome, LocalMessage, Router};
use crate::stats::{DispatchMetrics, DispatchStats};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use transport::{Rank, Transport, TransportError, TransportStats};

/// Running delivery task
///
/// Dropping it drops the shutdown sender, which also ends the loop.
struct Worker {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<(LocalReceiver, Result<()>)>,
}

/// Routes messages between distributed objects across ranks
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    registry: Arc<HandlerRegistry>,
    router: Arc<Router>,
    metrics: Arc<DispatchMetrics>,
    config: MessagingConfig,
    local_tx: mpsc::UnboundedSender<LocalMessage>,
    local_rx: Mutex<Option<LocalReceiver>>,
    transport_closed: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

impl Dispatcher {
    /// Create a dispatcher over `transport`. Delivery is not started.
    pub fn new(transport: Arc<dyn Transport>, config: MessagingConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(HandlerRegistry::new());
        let metrics = Arc::new(DispatchMetrics::new());
        let router = Arc::new(Router::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            config.log_dropped_frames,
        ));
        let (local_tx, local_rx) = mpsc::unbounded_channel();

        debug!(
            rank = %transport.local_rank(),
            world_size = transport.world_size(),
            local_short_circuit = config.local_short_circuit,
            "Created dispatcher"
        );

        Ok(Self {
            transport,
            registry,
            router,
            metrics,
            config,
            local_tx,
            local_rx: Mutex::new(Some(local_rx)),
            transport_closed: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        })
    }

    pub fn local_rank(&self) -> Rank {
        self.transport.local_rank()
    }

    pub fn world_size(&self) -> usize {
        self.transport.world_size()
    }

    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }

    /// The registry this dispatcher routes through
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Route messages for `handle` to `handler`, replacing any live handler.
    ///
    /// The registry keeps a weak reference; the caller keeps `handler` alive
    /// and unregisters before dropping it.
    pub fn register(
        &self,
        handle: ObjectHandle,
        handler: &Arc<dyn MessageHandler>,
    ) -> Result<Registered> {
        self.registry.register(handle, handler)
    }

    /// Like [`register`](Self::register), unregistering when the guard drops
    pub fn register_scoped(
        &self,
        handle: ObjectHandle,
        handler: &Arc<dyn MessageHandler>,
    ) -> Result<Registration> {
        let registered = self.registry.register(handle, handler)?;
        Ok(Registration::new(
            Arc::clone(&self.registry),
            handle,
            registered.generation(),
        ))
    }

    /// Stop routing to `handle`. Absent handles are not an error.
    pub fn unregister(&self, handle: ObjectHandle) -> bool {
        self.registry.unregister(handle)
    }

    pub fn lookup(&self, handle: ObjectHandle) -> Option<Arc<dyn MessageHandler>> {
        self.registry.lookup(handle)
    }

    /// Send `payload` to the object `handle` on rank `dest`.
    ///
    /// Returns after hand-off. Messages to one destination arrive in the
    /// order they were sent; there is no ordering across destinations.
    pub fn send_to(
        &self,
        dest: Rank,
        handle: ObjectHandle,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        let payload = payload.into();
        self.check_outbound(handle, &payload)?;
        self.check_rank(dest)?;

        if self.short_circuits(dest) {
            return self.enqueue_local(handle, payload);
        }

        let frame = frame::encode(handle, &payload);
        self.transport.send(dest, frame)?;
        DispatchMetrics::incr(&self.metrics.sent);
        trace!(dest = %dest, handle = %handle, len = payload.len(), "Sent message");
        Ok(())
    }

    /// Send `payload` to `handle` on every rank, the local one included.
    ///
    /// Ranks are visited in ascending order. The first failure stops the
    /// broadcast and is returned; ranks before it have already been sent to.
    pub fn broadcast(&self, handle: ObjectHandle, payload: impl Into<Bytes>) -> Result<()> {
        let payload = payload.into();
        self.check_outbound(handle, &payload)?;
        DispatchMetrics::incr(&self.metrics.broadcasts);

        let frame = frame::encode(handle, &payload);
        for dest in Rank::all(self.world_size()) {
            if self.short_circuits(dest) {
                self.enqueue_local(handle, payload.clone())?;
            } else {
                self.transport.send(dest, frame.clone())?;
                DispatchMetrics::incr(&self.metrics.sent);
            }
        }

        trace!(handle = %handle, len = payload.len(), "Broadcast message");
        Ok(())
    }

    /// Route one received frame synchronously on the calling thread
    pub fn deliver(&self, from: Rank, bytes: Bytes) -> DeliveryOutcome {
        self.router.route(from, bytes)
    }

    /// Start the delivery loop on the current tokio runtime.
    ///
    /// Frames that arrived while stopped are delivered once it runs. Returns
    /// `AlreadyRunning` until a previous loop has been reaped by
    /// [`stop`](Self::stop), even if that loop already ended on its own.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MessagingError::runtime(format!("No tokio runtime: {}", e)))?;

        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(MessagingError::AlreadyRunning);
        }

        let local_rx = self.local_rx.lock().take().ok_or_else(|| {
            MessagingError::runtime("Local queue lost after delivery task failure")
        })?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let delivery = DeliveryLoop {
            transport: Arc::clone(&self.transport),
            router: Arc::clone(&self.router),
            metrics: Arc::clone(&self.metrics),
            local_rx,
            shutdown: shutdown_rx,
            max_failures: self.config.max_consecutive_receive_failures,
            transport_closed: Arc::clone(&self.transport_closed),
        };

        let task = runtime.spawn(delivery.run());
        *worker = Some(Worker { shutdown, task });

        debug!(rank = %self.local_rank(), "Started delivery");
        Ok(())
    }

    /// Stop the delivery loop and wait for it to finish.
    ///
    /// The message being handled completes first. Returns the loop's own
    /// outcome, so a fatal receive failure surfaces here as
    /// `DeliveryFailed`. Stopping a stopped dispatcher is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        let _ = worker.shutdown.send(true);
        let result = match worker.task.await {
            Ok((local_rx, result)) => {
                *self.local_rx.lock() = Some(local_rx);
                result
            }
            Err(e) => Err(MessagingError::runtime(format!(
                "Delivery task failed: {}",
                e
            ))),
        };

        debug!(rank = %self.local_rank(), ok = result.is_ok(), "Stopped delivery");
        result
    }

    /// Check if the delivery loop is running
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|worker| !worker.task.is_finished())
            .unwrap_or(false)
    }

    pub fn stats(&self) -> DispatchStats {
        self.metrics.get_stats()
    }

    pub fn transport_stats(&self) -> TransportStats {
        self.transport.metrics()
    }

    fn check_outbound(&self, handle: ObjectHandle, payload: &Bytes) -> Result<()> {
        if !handle.is_valid() {
            return Err(MessagingError::InvalidHandle(handle.raw()));
        }

        if let Some(limit) = self.config.max_payload_size {
            if payload.len() > limit {
                return Err(MessagingError::PayloadTooLarge {
                    size: payload.len(),
                    limit,
                });
            }
        }

        Ok(())
    }

    fn check_rank(&self, dest: Rank) -> Result<()> {
        if !self.transport.is_valid_rank(dest) {
            return Err(TransportError::unknown_rank(dest, self.world_size()).into());
        }
        Ok(())
    }

    fn short_circuits(&self, dest: Rank) -> bool {
        self.config.local_short_circuit && dest == self.local_rank()
    }

    fn enqueue_local(&self, handle: ObjectHandle, payload: Bytes) -> Result<()> {
        // Nothing drains the queue once the transport has closed
        if self.transport_closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed.into());
        }

        let len = payload.len();
        self.local_tx
            .send(LocalMessage { handle, payload })
            .map_err(|_| TransportError::Closed)?;
        DispatchMetrics::incr(&self.metrics.sent_local);
        trace!(handle = %handle, len, "Queued local message");
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("local_rank", &self.local_rank())
            .field("world_size", &self.world_size())
            .field("config", &self.config)
            .field("handlers", &self.registry.len())
            .field("running", &self.is_running())
            .finish()
    }
}
