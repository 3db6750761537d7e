//! In-Process Fabric
//!
//! A set of endpoints, one per rank, wired together with unbounded tokio
//! channels. Every rank owns one inbox; all peers hold a sender to it. A
//! single channel per destination gives FIFO ordering for each
//! source/destination pair, which is the guarantee the real cluster
//! transport provides.
//!
//! Used as the loopback transport for single-process runs and as the
//! cluster stand-in for tests.

use crate::metrics::{TransportMetrics, TransportStats};
use crate::{Rank, Received, Result, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, trace};

/// Fabric configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Largest frame accepted by `send`, unlimited when `None`
    pub max_frame_size: Option<usize>,
}

/// Sending side of one rank's inbox, shared by every endpoint
#[derive(Debug)]
struct PeerLink {
    tx: mpsc::UnboundedSender<Received>,
    closed: AtomicBool,
    close_notify: Notify,
}

/// A fully connected group of in-process endpoints
#[derive(Debug)]
pub struct InProcessFabric {
    endpoints: Vec<Arc<FabricEndpoint>>,
}

impl InProcessFabric {
    /// Create a fabric with `world_size` ranks
    pub fn new(world_size: usize, config: FabricConfig) -> Self {
        let mut senders = Vec::with_capacity(world_size);
        let mut receivers = Vec::with_capacity(world_size);
        for _ in 0..world_size {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(PeerLink {
                tx,
                closed: AtomicBool::new(false),
                close_notify: Notify::new(),
            });
            receivers.push(rx);
        }

        let peers = Arc::new(senders);
        let endpoints = receivers
            .into_iter()
            .zip(Rank::all(world_size))
            .map(|(inbox, rank)| {
                Arc::new(FabricEndpoint {
                    rank,
                    peers: Arc::clone(&peers),
                    inbox: Mutex::new(inbox),
                    config: config.clone(),
                    metrics: TransportMetrics::new(),
                })
            })
            .collect();

        debug!("Created in-process fabric with {} ranks", world_size);
        Self { endpoints }
    }

    /// Single-rank fabric whose only endpoint sends to itself
    pub fn loopback() -> Arc<FabricEndpoint> {
        let mut fabric = Self::new(1, FabricConfig::default());
        fabric.endpoints.remove(0)
    }

    /// Number of ranks in the fabric
    pub fn world_size(&self) -> usize {
        self.endpoints.len()
    }

    /// Endpoint for `rank`
    pub fn endpoint(&self, rank: Rank) -> Option<Arc<FabricEndpoint>> {
        self.endpoints.get(rank.index()).cloned()
    }

    /// Take all endpoints, ordered by rank
    pub fn into_endpoints(self) -> Vec<Arc<FabricEndpoint>> {
        self.endpoints
    }
}

/// One rank's view of the fabric
pub struct FabricEndpoint {
    rank: Rank,
    peers: Arc<Vec<PeerLink>>,
    inbox: Mutex<mpsc::UnboundedReceiver<Received>>,
    config: FabricConfig,
    metrics: TransportMetrics,
}

impl std::fmt::Debug for FabricEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricEndpoint")
            .field("rank", &self.rank)
            .field("world_size", &self.peers.len())
            .field("config", &self.config)
            .finish()
    }
}

impl FabricEndpoint {
    /// Stop accepting frames addressed to this rank.
    ///
    /// Frames already queued can still be received; after they are drained
    /// `receive` returns `Ok(None)`. A pending `receive` is woken.
    pub fn close(&self) {
        debug!(rank = %self.rank, "Closing fabric endpoint");
        let link = self.own_link();
        link.closed.store(true, Ordering::Release);
        link.close_notify.notify_waiters();
    }

    /// Check if `close` has been called
    pub fn is_closed(&self) -> bool {
        self.own_link().closed.load(Ordering::Acquire)
    }

    fn own_link(&self) -> &PeerLink {
        &self.peers[self.rank.index()]
    }

    fn check_frame_size(&self, size: usize) -> Result<()> {
        match self.config.max_frame_size {
            Some(limit) if size > limit => Err(TransportError::frame_too_large(size, limit)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for FabricEndpoint {
    fn local_rank(&self) -> Rank {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, dest: Rank, frame: Bytes) -> Result<()> {
        let peer = match self.peers.get(dest.index()) {
            Some(peer) => peer,
            None => {
                self.metrics.record_send_error();
                return Err(TransportError::unknown_rank(dest, self.peers.len()));
            }
        };

        if let Err(e) = self.check_frame_size(frame.len()) {
            self.metrics.record_send_error();
            return Err(e);
        }

        if peer.closed.load(Ordering::Acquire) {
            self.metrics.record_send_error();
            return Err(TransportError::disconnected(dest));
        }

        let size = frame.len();
        trace!(from = %self.rank, to = %dest, size, "Fabric send");
        peer.tx
            .send(Received {
                from: self.rank,
                bytes: frame,
            })
            .map_err(|_| {
                self.metrics.record_send_error();
                TransportError::disconnected(dest)
            })?;

        self.metrics.record_send(size);
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Received>> {
        let link = self.own_link();
        let mut inbox = self.inbox.lock().await;

        // Register for the close wakeup before reading the flag.
        let notified = link.close_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if link.closed.load(Ordering::Acquire) {
            inbox.close();
        }

        let received = tokio::select! {
            biased;

            received = inbox.recv() => received,
            () = &mut notified => {
                inbox.close();
                inbox.recv().await
            }
        };

        if let Some(received) = &received {
            self.metrics.record_receive(received.bytes.len());
        }
        Ok(received)
    }

    fn metrics(&self) -> TransportStats {
        self.metrics.get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_roundtrip() {
        let endpoint = InProcessFabric::loopback();
        assert_eq!(endpoint.local_rank(), Rank::ZERO);
        assert_eq!(endpoint.world_size(), 1);

        endpoint
            .send(Rank::ZERO, Bytes::from_static(b"ping"))
            .unwrap();
        let received = endpoint.receive().await.unwrap().unwrap();

        assert_eq!(received.from, Rank::ZERO);
        assert_eq!(received.bytes, Bytes::from_static(b"ping"));
        assert_eq!(endpoint.metrics().frames_sent, 1);
        assert_eq!(endpoint.metrics().frames_received, 1);
    }

    #[tokio::test]
    async fn test_unknown_rank_rejected() {
        let endpoint = InProcessFabric::loopback();
        let err = endpoint
            .send(Rank::new(5), Bytes::from_static(b"x"))
            .unwrap_err();

        assert_eq!(err, TransportError::unknown_rank(Rank::new(5), 1));
        assert_eq!(endpoint.metrics().send_errors, 1);
    }

    #[tokio::test]
    async fn test_frame_limit() {
        let fabric = InProcessFabric::new(
            2,
            FabricConfig {
                max_frame_size: Some(4),
            },
        );
        let rank0 = fabric.endpoint(Rank::new(0)).unwrap();

        assert!(rank0.send(Rank::new(1), Bytes::from_static(b"1234")).is_ok());
        let err = rank0
            .send(Rank::new(1), Bytes::from_static(b"12345"))
            .unwrap_err();
        assert_eq!(err, TransportError::frame_too_large(5, 4));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let fabric = InProcessFabric::new(2, FabricConfig::default());
        let rank0 = fabric.endpoint(Rank::new(0)).unwrap();
        let rank1 = fabric.endpoint(Rank::new(1)).unwrap();

        rank0.send(Rank::new(1), Bytes::from_static(b"a")).unwrap();
        rank1.close();
        assert!(rank1.is_closed());

        let err = rank0
            .send(Rank::new(1), Bytes::from_static(b"b"))
            .unwrap_err();
        assert_eq!(err, TransportError::disconnected(Rank::new(1)));

        let first = rank1.receive().await.unwrap().unwrap();
        assert_eq!(first.bytes, Bytes::from_static(b"a"));
        assert!(rank1.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_pending_receive() {
        let endpoint = InProcessFabric::loopback();
        let waiter = Arc::clone(&endpoint);
        let pending = tokio::spawn(async move { waiter.receive().await });

        tokio::task::yield_now().await;
        endpoint.close();

        let received = pending.await.unwrap().unwrap();
        assert!(received.is_none());
    }
}
