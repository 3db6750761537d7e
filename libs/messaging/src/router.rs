//! Inbound routing
//!
//! Turns one arrived frame into at most one handler invocation. Shared by
//! the delivery loop and [`Dispatcher::deliver`](crate::Dispatcher::deliver).
//! Nothing here returns an error: every anomaly is a [`DeliveryOutcome`].

use crate::frame::{self, FrameError};
use crate::handle::ObjectHandle;
use crate::registry::{HandlerRegistry, Resolution};
use crate::stats::DispatchMetrics;
use bytes::Bytes;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};
use transport::Rank;

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A live handler consumed the payload
    Delivered(ObjectHandle),
    /// No registration for the handle
    Unregistered(ObjectHandle),
    /// The registered handler's owner no longer exists
    Stale(ObjectHandle),
    /// The frame could not be decoded
    Malformed(FrameError),
    /// The handler panicked while consuming
    HandlerPanicked(ObjectHandle),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// Self-send queued for the delivery loop
#[derive(Debug)]
pub(crate) struct LocalMessage {
    pub handle: ObjectHandle,
    pub payload: Bytes,
}

#[derive(Debug)]
pub(crate) struct Router {
    registry: Arc<HandlerRegistry>,
    metrics: Arc<DispatchMetrics>,
    log_dropped: bool,
}

impl Router {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        metrics: Arc<DispatchMetrics>,
        log_dropped: bool,
    ) -> Self {
        Self {
            registry,
            metrics,
            log_dropped,
        }
    }

    /// Decode a framed message and hand it to its handler
    pub fn route(&self, from: Rank, bytes: Bytes) -> DeliveryOutcome {
        match frame::decode(bytes) {
            Ok((handle, payload)) => self.dispatch(from, handle, payload),
            Err(err) => {
                DispatchMetrics::incr(&self.metrics.dropped_malformed);
                if self.log_dropped {
                    warn!(from = %from, error = %err, "Dropping malformed frame");
                } else {
                    debug!(from = %from, error = %err, "Dropping malformed frame");
                }
                DeliveryOutcome::Malformed(err)
            }
        }
    }

    /// Hand an already decoded message to its handler
    pub fn dispatch(&self, from: Rank, handle: ObjectHandle, payload: Bytes) -> DeliveryOutcome {
        let handler = match self.registry.resolve(handle) {
            Resolution::Live(handler) => handler,
            Resolution::Missing => {
                DispatchMetrics::incr(&self.metrics.dropped_unregistered);
                self.report_drop(from, handle, "unregistered");
                return DeliveryOutcome::Unregistered(handle);
            }
            Resolution::Stale => {
                DispatchMetrics::incr(&self.metrics.dropped_stale);
                self.report_drop(from, handle, "handler dropped");
                return DeliveryOutcome::Stale(handle);
            }
        };

        trace!(from = %from, handle = %handle, len = payload.len(), "Delivering message");

        // No registry lock is held while the handler runs.
        match panic::catch_unwind(AssertUnwindSafe(|| handler.consume(from, payload))) {
            Ok(()) => {
                DispatchMetrics::incr(&self.metrics.delivered);
                DeliveryOutcome::Delivered(handle)
            }
            Err(_) => {
                DispatchMetrics::incr(&self.metrics.handler_panics);
                error!(from = %from, handle = %handle, "Message handler panicked");
                DeliveryOutcome::HandlerPanicked(handle)
            }
        }
    }

    fn report_drop(&self, from: Rank, handle: ObjectHandle, reason: &'static str) {
        if self.log_dropped {
            warn!(from = %from, handle = %handle, reason, "Dropping message");
        } else {
            debug!(from = %from, handle = %handle, reason, "Dropping message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MessageHandler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn router() -> (Router, Arc<HandlerRegistry>, Arc<DispatchMetrics>) {
        let registry = Arc::new(HandlerRegistry::new());
        let metrics = Arc::new(DispatchMetrics::new());
        let router = Router::new(Arc::clone(&registry), Arc::clone(&metrics), true);
        (router, registry, metrics)
    }

    #[test]
    fn test_routes_to_handler() {
        let (router, registry, metrics) = router();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler: Arc<dyn MessageHandler> = Arc::new(move |from: Rank, payload: Bytes| {
            assert_eq!(from, Rank::new(3));
            assert_eq!(payload, Bytes::from_static(&[0xAA, 0xBB]));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registry.register(ObjectHandle::new(42), &handler).unwrap();

        let outcome = router.route(
            Rank::new(3),
            frame::encode(ObjectHandle::new(42), &[0xAA, 0xBB]),
        );

        assert_eq!(outcome, DeliveryOutcome::Delivered(ObjectHandle::new(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.get_stats().delivered, 1);
    }

    #[test]
    fn test_drops_are_counted() {
        let (router, registry, metrics) = router();

        let outcome = router.route(Rank::ZERO, frame::encode(ObjectHandle::new(99), b"x"));
        assert_eq!(outcome, DeliveryOutcome::Unregistered(ObjectHandle::new(99)));

        let outcome = router.route(Rank::ZERO, Bytes::from_static(&[1, 2]));
        assert_eq!(
            outcome,
            DeliveryOutcome::Malformed(FrameError::Truncated { len: 2 })
        );

        let handler: Arc<dyn MessageHandler> = Arc::new(|_: Rank, _: Bytes| {});
        registry.register(ObjectHandle::new(5), &handler).unwrap();
        drop(handler);
        let outcome = router.route(Rank::ZERO, frame::encode(ObjectHandle::new(5), b""));
        assert_eq!(outcome, DeliveryOutcome::Stale(ObjectHandle::new(5)));

        let stats = metrics.get_stats();
        assert_eq!(stats.dropped_unregistered, 1);
        assert_eq!(stats.dropped_malformed, 1);
        assert_eq!(stats.dropped_stale, 1);
        assert_eq!(stats.total_dropped(), 3);
        assert_eq!(stats.delivered, 0);
    }

    #[test]
    fn test_handler_panic_is_contained() {
        let (router, registry, metrics) = router();
        let panicking: Arc<dyn MessageHandler> = Arc::new(|_: Rank, _: Bytes| {
            panic!("handler failure");
        });
        registry.register(ObjectHandle::new(1), &panicking).unwrap();

        let outcome = router.dispatch(Rank::ZERO, ObjectHandle::new(1), Bytes::new());
        assert_eq!(outcome, DeliveryOutcome::HandlerPanicked(ObjectHandle::new(1)));
        assert_eq!(metrics.get_stats().handler_panics, 1);

        // Registration survives and still routes
        assert!(registry.contains(ObjectHandle::new(1)));
    }
}
