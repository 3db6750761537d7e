//! Common Test Utilities for Messaging
//!
//! Handlers that forward into channels, cluster builders and polling helpers
//! shared by the integration suites.

#![allow(dead_code)]

use bytes::Bytes;
use messaging::{Dispatcher, MessageHandler, MessagingConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use transport::{FabricConfig, InProcessFabric, Rank};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub type Inbox = mpsc::UnboundedReceiver<(Rank, Bytes)>;

/// Initialize tracing for tests (call once per test)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Both routing modes for self-sends
pub fn configs() -> [MessagingConfig; 2] {
    [MessagingConfig::default(), MessagingConfig::transport_only()]
}

/// Handler that forwards every message into a channel
pub fn forwarding_handler() -> (Arc<dyn MessageHandler>, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: Arc<dyn MessageHandler> = Arc::new(move |from: Rank, payload: Bytes| {
        let _ = tx.send((from, payload));
    });
    (handler, rx)
}

/// Wait for the next message a forwarding handler received
pub async fn next(inbox: &mut Inbox) -> (Rank, Bytes) {
    tokio::time::timeout(TIMEOUT, inbox.recv())
        .await
        .expect("timed out waiting for delivery")
        .expect("handler channel closed")
}

/// Wait until `condition` holds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Started dispatcher on a single-rank loopback fabric
pub fn loopback(config: MessagingConfig) -> Dispatcher {
    let dispatcher = Dispatcher::new(InProcessFabric::loopback(), config).unwrap();
    dispatcher.start().unwrap();
    dispatcher
}

/// Started dispatchers for every rank of an in-process fabric
pub fn cluster(world_size: usize, config: MessagingConfig) -> Vec<Arc<Dispatcher>> {
    InProcessFabric::new(world_size, FabricConfig::default())
        .into_endpoints()
        .into_iter()
        .map(|endpoint| {
            let dispatcher = Dispatcher::new(endpoint, config.clone()).unwrap();
            dispatcher.start().unwrap();
            Arc::new(dispatcher)
        })
        .collect()
}

pub async fn stop_all(dispatchers: &[Arc<Dispatcher>]) {
    for dispatcher in dispatchers {
        dispatcher.stop().await.unwrap();
    }
}
