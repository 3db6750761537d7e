//! Rank Transport
//!
//! Point-to-point byte transfer between the ranks of a rendering cluster.
//! The transport moves opaque frames; it knows nothing about object handles
//! or handlers. Higher layers (see the `messaging` crate) frame and route.
//!
//! # Contract
//!
//! - **Non-blocking send**: [`Transport::send`] hands a frame off and returns.
//!   Delivery is asynchronous and unacknowledged.
//! - **Pull delivery**: [`Transport::receive`] yields the next frame that
//!   arrived from any rank, tagged with its source rank.
//! - **FIFO per pair**: frames from one source to one destination arrive in
//!   send order. Nothing is promised across different pairs.
//!
//! ```text
//! ┌──────────┐  send(dest, frame)   ┌──────────────────┐   receive()   ┌──────────┐
//! │  rank-0  │ ───────────────────> │  fabric channels │ ────────────> │  rank-1  │
//! └──────────┘                      └──────────────────┘               └──────────┘
//! ```

pub mod error;
pub mod fabric;
pub mod metrics;
pub mod rank;

pub use error::{Result, TransportError};
pub use fabric::{FabricConfig, FabricEndpoint, InProcessFabric};
pub use metrics::{TransportMetrics, TransportStats};
pub use rank::Rank;

use async_trait::async_trait;
use bytes::Bytes;

/// A frame that arrived from a remote (or the local) rank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Rank the frame was sent from
    pub from: Rank,
    /// Raw frame bytes, exactly as sent
    pub bytes: Bytes,
}

impl Received {
    pub fn new(from: Rank, bytes: impl Into<Bytes>) -> Self {
        Self {
            from,
            bytes: bytes.into(),
        }
    }
}

/// Point-to-point transport between ranks
///
/// Object-safe so it can be shared as `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Rank of the process owning this transport
    fn local_rank(&self) -> Rank;

    /// Number of ranks in the run; valid ranks are `0..world_size`
    fn world_size(&self) -> usize;

    /// Hand a frame off for delivery to `dest`.
    ///
    /// Must not wait for delivery. Returns an error if `dest` is not a valid
    /// rank or the destination can no longer be reached.
    fn send(&self, dest: Rank, frame: Bytes) -> Result<()>;

    /// Wait for the next frame from any rank.
    ///
    /// `Ok(None)` means the transport is closed and no further frames will
    /// arrive. Implementations must be cancel safe: dropping the future
    /// before it completes must not lose a frame.
    async fn receive(&self) -> Result<Option<Received>>;

    /// Counters for monitoring
    fn metrics(&self) -> TransportStats {
        TransportStats::default()
    }

    /// Check whether `rank` addresses a member of this run
    fn is_valid_rank(&self, rank: Rank) -> bool {
        rank.index() < self.world_size()
    }
}
