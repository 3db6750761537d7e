//! Transport Error Types
//!
//! Failures of the point-to-point byte layer. None of these describe frame
//! contents; the transport never looks inside a frame.

use crate::rank::Rank;
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Destination is outside `0..world_size`
    #[error("Unknown rank: {rank} (world size {world_size})")]
    UnknownRank { rank: Rank, world_size: usize },

    /// Destination rank stopped accepting frames
    #[error("Rank disconnected: {rank}")]
    Disconnected { rank: Rank },

    /// The local endpoint was closed
    #[error("Transport closed")]
    Closed,

    /// Frame exceeds the configured limit
    #[error("Frame too large: {size}B exceeds limit of {limit}B")]
    FrameTooLarge { size: usize, limit: usize },

    /// Generic I/O failure reported by a concrete transport
    #[error("I/O error: {message}")]
    Io { message: String },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create an unknown rank error
    pub fn unknown_rank(rank: Rank, world_size: usize) -> Self {
        Self::UnknownRank { rank, world_size }
    }

    /// Create a disconnected error
    pub fn disconnected(rank: Rank) -> Self {
        Self::Disconnected { rank }
    }

    /// Create a frame too large error
    pub fn frame_too_large(size: usize, limit: usize) -> Self {
        Self::FrameTooLarge { size, limit }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Check if retrying the same operation could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::FrameTooLarge { .. })
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}
