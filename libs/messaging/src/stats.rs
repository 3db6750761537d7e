//! Dispatcher counters
//!
//! Dropped frames are expected during object teardown, so they are counted
//! here rather than reported as errors.

use std::sync::atomic::{AtomicU64, Ordering};

/// Dispatcher metrics
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Frames handed to the transport
    pub sent: AtomicU64,
    /// Frames routed through the local queue
    pub sent_local: AtomicU64,
    /// Broadcast operations started
    pub broadcasts: AtomicU64,
    /// Payloads handed to a live handler
    pub delivered: AtomicU64,
    /// Frames for handles with no registration
    pub dropped_unregistered: AtomicU64,
    /// Frames for handles whose handler object no longer exists
    pub dropped_stale: AtomicU64,
    /// Frames too short or carrying an invalid handle
    pub dropped_malformed: AtomicU64,
    /// Handler invocations that panicked
    pub handler_panics: AtomicU64,
    /// Receive calls that returned an error
    pub receive_errors: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot
    pub fn get_stats(&self) -> DispatchStats {
        DispatchStats {
            sent: self.sent.load(Ordering::Relaxed),
            sent_local: self.sent_local.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_unregistered: self.dropped_unregistered.load(Ordering::Relaxed),
            dropped_stale: self.dropped_stale.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
        }
    }
}

/// Dispatcher statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: u64,
    pub sent_local: u64,
    pub broadcasts: u64,
    pub delivered: u64,
    pub dropped_unregistered: u64,
    pub dropped_stale: u64,
    pub dropped_malformed: u64,
    pub handler_panics: u64,
    pub receive_errors: u64,
}

impl DispatchStats {
    /// Frames that arrived but reached no handler
    pub fn total_dropped(&self) -> u64 {
        self.dropped_unregistered + self.dropped_stale + self.dropped_malformed
    }

    /// Frames sent by any route
    pub fn total_sent(&self) -> u64 {
        self.sent + self.sent_local
    }
}
