//! # Delivery Loop
//!
//! Background task that pulls frames from the transport and self-sends from
//! the local queue, routing each one before taking the next.
//!
//! ```text
//!            ┌──────────── shutdown (watch) ────────────┐
//!            │                                          │
//! local queue ──┐                                       ▼
//!               ├──> select! ──> Router::route ──> handler.consume
//! transport.receive() ─┘
//! ```
//!
//! ## Exit Conditions
//! - Shutdown signalled, or the signalling side dropped: `Ok(())`
//! - Transport reports closed (`Ok(None)`): `Ok(())`, and later self-sends
//!   are refused
//! - `max_failures` receive errors in a row: `DeliveryFailed`
//!
//! Shutdown always wins. The local queue and the transport alternate
//! priority, so a handler that keeps sending to itself cannot starve remote
//! frames.
//!
//! The local receiver is handed back on every exit so a stopped dispatcher
//! keeps its queued self-sends and can be started again.

use crate::error::{MessagingError, Result};
use crate::router::{LocalMessage, Router};
use crate::stats::DispatchMetrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};
use transport::{Received, Transport};

pub(crate) type LocalReceiver = mpsc::UnboundedReceiver<LocalMessage>;

pub(crate) struct DeliveryLoop {
    pub transport: Arc<dyn Transport>,
    pub router: Arc<Router>,
    pub metrics: Arc<DispatchMetrics>,
    pub local_rx: LocalReceiver,
    pub shutdown: watch::Receiver<bool>,
    pub max_failures: u32,
    /// Set once the transport reports closed
    pub transport_closed: Arc<AtomicBool>,
}

enum Event {
    Shutdown { dropped: bool },
    Local(LocalMessage),
    Received(transport::Result<Option<Received>>),
}

impl DeliveryLoop {
    pub async fn run(self) -> (LocalReceiver, Result<()>) {
        let DeliveryLoop {
            transport,
            router,
            metrics,
            mut local_rx,
            mut shutdown,
            max_failures,
            transport_closed,
        } = self;

        let local_rank = transport.local_rank();
        let mut failures = 0u32;
        // Local and transport sources take turns going first
        let mut local_first = true;
        debug!(rank = %local_rank, "Delivery loop started");

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            let event = if local_first {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => Event::Shutdown { dropped: changed.is_err() },
                    Some(message) = local_rx.recv() => Event::Local(message),
                    received = transport.receive() => Event::Received(received),
                }
            } else {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => Event::Shutdown { dropped: changed.is_err() },
                    received = transport.receive() => Event::Received(received),
                    Some(message) = local_rx.recv() => Event::Local(message),
                }
            };

            match event {
                Event::Shutdown { dropped } => {
                    if dropped {
                        break Ok(());
                    }
                }
                Event::Local(message) => {
                    local_first = false;
                    router.dispatch(local_rank, message.handle, message.payload);
                }
                Event::Received(received) => {
                    local_first = true;
                    match received {
                        Ok(Some(received)) => {
                            failures = 0;
                            router.route(received.from, received.bytes);
                        }
                        Ok(None) => {
                            transport_closed.store(true, Ordering::Release);
                            debug!(rank = %local_rank, "Transport closed");
                            break Ok(());
                        }
                        Err(e) => {
                            failures += 1;
                            DispatchMetrics::incr(&metrics.receive_errors);

                            if failures >= max_failures {
                                error!(
                                    rank = %local_rank,
                                    failures,
                                    error = %e,
                                    "Receive keeps failing, stopping delivery"
                                );
                                break Err(MessagingError::DeliveryFailed { failures, source: e });
                            }

                            warn!(
                                rank = %local_rank,
                                failures,
                                max_failures,
                                error = %e,
                                "Receive failed"
                            );
                        }
                    }
                }
            }
        };

        debug!(rank = %local_rank, ok = result.is_ok(), "Delivery loop stopped");
        (local_rx, result)
    }
}
