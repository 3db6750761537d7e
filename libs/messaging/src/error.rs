//! # Messaging Error Types
//!
//! Errors surfaced to callers of the dispatcher. Data-plane anomalies on the
//! receive side (unregistered handles, malformed frames) are not errors:
//! they are dropped, logged and counted. Only send failures and fatal
//! delivery failures reach the caller.

use thiserror::Error;
use transport::TransportError;

/// Messaging operation errors
#[derive(Error, Debug)]
pub enum MessagingError {
    /// Handle is negative and cannot name a live object
    #[error("Invalid object handle: {0}")]
    InvalidHandle(i64),

    /// Payload exceeds `max_payload_size`
    #[error("Payload too large: {size}B exceeds limit of {limit}B")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Send or receive primitive failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// `start` called while the delivery loop is running
    #[error("Delivery loop already running")]
    AlreadyRunning,

    /// Receive kept failing; this rank can no longer take part
    #[error("Delivery failed after {failures} consecutive receive errors: {source}")]
    DeliveryFailed {
        failures: u32,
        #[source]
        source: TransportError,
    },

    /// Task runtime problem (no runtime, task panicked or was cancelled)
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type for messaging operations
pub type Result<T> = std::result::Result<T, MessagingError>;

impl MessagingError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a runtime error
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Check if the caller can retry or carry on
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_recoverable(),
            Self::PayloadTooLarge { .. } | Self::InvalidHandle(_) | Self::AlreadyRunning => true,
            Self::Config(_) | Self::DeliveryFailed { .. } | Self::Runtime(_) => false,
        }
    }

    /// Check if this error ends the rank's participation in the run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeliveryFailed { .. })
    }
}
