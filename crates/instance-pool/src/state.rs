//! Swappable pool snapshot.

use std::sync::Arc;

use crate::registry::Registry;

/// A registry paired with its declared size.
///
/// Exactly one `PoolState` is current at a time; it is replaced whole by a
/// single atomic store on the pool context.
pub struct PoolState<H> {
    /// The registry holding this pool's instances
    pub registry: Arc<Registry<H>>,
    /// Declared number of instances
    pub size: usize,
}

impl<H> PoolState<H> {
    /// Wrap `registry`, taking its capacity as the pool size.
    pub fn new(registry: Registry<H>) -> Self {
        let size = registry.capacity();
        Self {
            registry: Arc::new(registry),
            size,
        }
    }

    /// Whether every slot of the pool has a registered instance.
    pub fn is_fully_initialized(&self) -> bool {
        self.registry.registered_element_count() == self.size
    }
}

impl<H> Clone for PoolState<H> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            size: self.size,
        }
    }
}

impl<H> std::fmt::Debug for PoolState<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolState")
            .field("size", &self.size)
            .field("registry", &self.registry)
            .finish()
    }
}
