//! Scoped handler registration
//!
//! A [`Registration`] ties a handle's mapping to the lifetime of the object
//! that owns it. Dropping the guard unregisters the handle unless a newer
//! registration has since replaced it.

use crate::handle::ObjectHandle;
use crate::registry::HandlerRegistry;
use std::sync::Arc;

/// RAII guard for one handler registration
#[derive(Debug)]
#[must_use = "dropping the guard unregisters the handler immediately"]
pub struct Registration {
    registry: Arc<HandlerRegistry>,
    handle: ObjectHandle,
    generation: u64,
}

impl Registration {
    pub(crate) fn new(registry: Arc<HandlerRegistry>, handle: ObjectHandle, generation: u64) -> Self {
        Self {
            registry,
            handle,
            generation,
        }
    }

    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Check if the registry still routes to this registration
    pub fn is_current(&self) -> bool {
        self.registry.generation(self.handle) == Some(self.generation)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry
            .unregister_generation(self.handle, self.generation);
    }
}
