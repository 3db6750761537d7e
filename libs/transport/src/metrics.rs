//! Transport counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Transport performance metrics
#[derive(Debug, Default)]
pub struct TransportMetrics {
    /// Frames handed off successfully
    pub frames_sent: AtomicU64,
    /// Payload bytes handed off successfully
    pub bytes_sent: AtomicU64,
    /// Frames returned from receive
    pub frames_received: AtomicU64,
    /// Bytes returned from receive
    pub bytes_received: AtomicU64,
    /// Sends rejected by the transport
    pub send_errors: AtomicU64,
}

impl TransportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful hand-off
    pub fn record_send(&self, frame_size: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent
            .fetch_add(frame_size as u64, Ordering::Relaxed);
    }

    /// Record a rejected send
    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame handed to the receiver
    pub fn record_receive(&self, frame_size: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(frame_size as u64, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot
    pub fn get_stats(&self) -> TransportStats {
        TransportStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }
}

/// Transport statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub frames_received: u64,
    pub bytes_received: u64,
    pub send_errors: u64,
}

impl TransportStats {
    /// Average size of frames sent, if any were sent
    pub fn average_frame_size(&self) -> Option<f64> {
        if self.frames_sent > 0 {
            Some(self.bytes_sent as f64 / self.frames_sent as f64)
        } else {
            None
        }
    }
}
