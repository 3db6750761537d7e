//! Message Handler capability
//!
//! Any distributed object that wants messages addressed to its handle
//! implements [`MessageHandler`]. The registry stores the capability as a
//! trait object and never sees the concrete object type.

use bytes::Bytes;
use transport::Rank;

/// Consumes messages addressed to one object handle
///
/// `consume` runs on the delivery task, one message at a time per task.
/// Implementations synchronize their own shared state and must not block
/// waiting on anything the delivery task itself has to produce (such as a
/// reply that would be delivered to this rank).
pub trait MessageHandler: Send + Sync {
    /// Handle one payload sent by `from`
    fn consume(&self, from: Rank, payload: Bytes);
}

impl<F> MessageHandler for F
where
    F: Fn(Rank, Bytes) + Send + Sync,
{
    fn consume(&self, from: Rank, payload: Bytes) {
        self(from, payload)
    }
}
