//! # Object Handle Registry
//!
//! Maps an [`ObjectHandle`] to the handler consuming messages for that object
//! on this rank.
//!
//! ## Ownership
//!
//! Handlers are owned by their distributed objects. The registry keeps only a
//! `Weak` reference, so an object dropped without unregistering leaves a
//! stale entry rather than a dangling one. Stale entries resolve to
//! [`Resolution::Stale`] and are pruned on the spot.
//!
//! ## Duplicate Registration
//!
//! Registering a handle that already has a live handler replaces it and logs
//! a warning. Every registration gets a fresh generation number so a
//! [`Registration`](crate::Registration) guard from an older incarnation
//! cannot remove its successor.
//!
//! ## Concurrency
//!
//! Backed by `DashMap`: lookups from the delivery task take a shard read
//! lock and never wait on the handler itself. No map reference is held while
//! a handler runs.

use crate::error::{MessagingError, Result};
use crate::handle::ObjectHandle;
use crate::handler::MessageHandler;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

#[derive(Debug)]
struct Entry {
    handler: Weak<dyn MessageHandler>,
    generation: u64,
}

/// Result of a successful registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    /// No live handler held the handle
    Installed { generation: u64 },
    /// A live handler was displaced
    Replaced { generation: u64 },
}

impl Registered {
    pub fn generation(self) -> u64 {
        match self {
            Self::Installed { generation } | Self::Replaced { generation } => generation,
        }
    }

    pub fn replaced(self) -> bool {
        matches!(self, Self::Replaced { .. })
    }
}

/// What a handle currently routes to
pub enum Resolution {
    /// Registered and its owner is alive
    Live(Arc<dyn MessageHandler>),
    /// Registered but the owning object has been dropped
    Stale,
    /// Never registered, or unregistered
    Missing,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live(_) => f.write_str("Live"),
            Self::Stale => f.write_str("Stale"),
            Self::Missing => f.write_str("Missing"),
        }
    }
}

/// Handle to handler mapping for the local rank
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    entries: DashMap<ObjectHandle, Entry>,
    next_generation: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `handle`, replacing any previous handler
    pub fn register(
        &self,
        handle: ObjectHandle,
        handler: &Arc<dyn MessageHandler>,
    ) -> Result<Registered> {
        if !handle.is_valid() {
            return Err(MessagingError::InvalidHandle(handle.raw()));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self.entries.insert(
            handle,
            Entry {
                handler: Arc::downgrade(handler),
                generation,
            },
        );

        match previous {
            Some(old) if old.handler.strong_count() > 0 => {
                warn!(
                    handle = %handle,
                    previous_generation = old.generation,
                    generation,
                    "Replacing live handler registration"
                );
                Ok(Registered::Replaced { generation })
            }
            _ => {
                debug!(handle = %handle, generation, "Registered handler");
                Ok(Registered::Installed { generation })
            }
        }
    }

    /// Remove the mapping for `handle`. Absent handles are not an error.
    ///
    /// Returns whether a mapping was removed.
    pub fn unregister(&self, handle: ObjectHandle) -> bool {
        let removed = self.entries.remove(&handle).is_some();
        debug!(handle = %handle, removed, "Unregistered handler");
        removed
    }

    /// Remove the mapping only if it is still the given registration
    pub fn unregister_generation(&self, handle: ObjectHandle, generation: u64) -> bool {
        let removed = self
            .entries
            .remove_if(&handle, |_, entry| entry.generation == generation)
            .is_some();
        if removed {
            debug!(handle = %handle, generation, "Released scoped registration");
        }
        removed
    }

    /// Current generation registered for `handle`, if any
    pub fn generation(&self, handle: ObjectHandle) -> Option<u64> {
        self.entries.get(&handle).map(|entry| entry.generation)
    }

    /// Find the live handler for `handle`
    pub fn lookup(&self, handle: ObjectHandle) -> Option<Arc<dyn MessageHandler>> {
        match self.resolve(handle) {
            Resolution::Live(handler) => Some(handler),
            Resolution::Stale | Resolution::Missing => None,
        }
    }

    /// Classify `handle`, pruning it if its owner is gone
    pub fn resolve(&self, handle: ObjectHandle) -> Resolution {
        let (weak, generation) = match self.entries.get(&handle) {
            Some(entry) => (entry.handler.clone(), entry.generation),
            None => return Resolution::Missing,
        };

        match weak.upgrade() {
            Some(handler) => Resolution::Live(handler),
            None => {
                self.unregister_generation(handle, generation);
                Resolution::Stale
            }
        }
    }

    /// Check if `handle` has a live handler
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.entries
            .get(&handle)
            .map(|entry| entry.handler.strong_count() > 0)
            .unwrap_or(false)
    }

    /// Number of entries, including stale ones not yet pruned
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered handles in ascending order
    pub fn handles(&self) -> Vec<ObjectHandle> {
        let mut handles: Vec<_> = self.entries.iter().map(|entry| *entry.key()).collect();
        handles.sort_unstable();
        handles
    }

    /// Drop every entry whose owner is gone, returning how many were removed
    pub fn prune_stale(&self) -> usize {
        let mut pruned = 0;
        self.entries.retain(|_, entry| {
            let live = entry.handler.strong_count() > 0;
            if !live {
                pruned += 1;
            }
            live
        });
        if pruned > 0 {
            debug!(pruned, "Pruned stale handler registrations");
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use transport::Rank;

    fn recording_handler() -> (Arc<dyn MessageHandler>, Arc<Mutex<Vec<Bytes>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Arc<dyn MessageHandler> =
            Arc::new(move |_from: Rank, payload: Bytes| sink.lock().push(payload));
        (handler, seen)
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = HandlerRegistry::new();
        let (handler, seen) = recording_handler();

        let registered = registry.register(ObjectHandle::new(42), &handler).unwrap();
        assert!(!registered.replaced());
        assert!(registry.contains(ObjectHandle::new(42)));

        let found = registry.lookup(ObjectHandle::new(42)).unwrap();
        found.consume(Rank::ZERO, Bytes::from_static(b"x"));
        assert_eq!(seen.lock().len(), 1);

        assert!(registry.lookup(ObjectHandle::new(43)).is_none());
    }

    #[test]
    fn test_rejects_negative_handle() {
        let registry = HandlerRegistry::new();
        let (handler, _) = recording_handler();

        let err = registry.register(ObjectHandle::new(-1), &handler).unwrap_err();
        assert!(matches!(err, MessagingError::InvalidHandle(-1)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_replace_policy() {
        let registry = HandlerRegistry::new();
        let (first, first_seen) = recording_handler();
        let (second, second_seen) = recording_handler();
        let handle = ObjectHandle::new(7);

        let a = registry.register(handle, &first).unwrap();
        let b = registry.register(handle, &second).unwrap();
        assert!(b.replaced());
        assert!(b.generation() > a.generation());
        assert_eq!(registry.len(), 1);

        registry
            .lookup(handle)
            .unwrap()
            .consume(Rank::ZERO, Bytes::new());
        assert!(first_seen.lock().is_empty());
        assert_eq!(second_seen.lock().len(), 1);
    }

    #[test]
    fn test_replacing_stale_is_install() {
        let registry = HandlerRegistry::new();
        let handle = ObjectHandle::new(3);
        {
            let (gone, _) = recording_handler();
            registry.register(handle, &gone).unwrap();
        }

        let (fresh, _) = recording_handler();
        assert!(!registry.register(handle, &fresh).unwrap().replaced());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = HandlerRegistry::new();
        let (handler, _) = recording_handler();
        registry.register(ObjectHandle::new(1), &handler).unwrap();

        assert!(registry.unregister(ObjectHandle::new(1)));
        assert!(!registry.unregister(ObjectHandle::new(1)));
        assert!(registry.lookup(ObjectHandle::new(1)).is_none());
    }

    #[test]
    fn test_generation_guarded_unregister() {
        let registry = HandlerRegistry::new();
        let (old, _) = recording_handler();
        let (new, _) = recording_handler();
        let handle = ObjectHandle::new(9);

        let old_gen = registry.register(handle, &old).unwrap().generation();
        let new_gen = registry.register(handle, &new).unwrap().generation();

        assert!(!registry.unregister_generation(handle, old_gen));
        assert_eq!(registry.generation(handle), Some(new_gen));
        assert!(registry.unregister_generation(handle, new_gen));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dropped_owner_resolves_stale() {
        let registry = HandlerRegistry::new();
        let handle = ObjectHandle::new(5);
        let (handler, _) = recording_handler();
        registry.register(handle, &handler).unwrap();
        drop(handler);

        assert!(!registry.contains(handle));
        assert!(matches!(registry.resolve(handle), Resolution::Stale));
        // Pruned by the first resolve
        assert!(matches!(registry.resolve(handle), Resolution::Missing));
    }

    #[test]
    fn test_prune_stale() {
        let registry = HandlerRegistry::new();
        let (kept, _) = recording_handler();
        registry.register(ObjectHandle::new(1), &kept).unwrap();
        for raw in 2..5 {
            let (gone, _) = recording_handler();
            registry.register(ObjectHandle::new(raw), &gone).unwrap();
        }

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.prune_stale(), 3);
        assert_eq!(registry.handles(), vec![ObjectHandle::new(1)]);
    }
}
