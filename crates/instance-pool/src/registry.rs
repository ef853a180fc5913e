//! Bounded blocking container of pool instances.
//!
//! The registry tracks two things: the set of *registered* instance ids
//! (resident or currently borrowed) and the queue of *available* instances.
//! Its capacity is fixed at construction. Once a pill is inserted, borrowers
//! that find no available instance receive the pill instead of waiting.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::instance::{Instance, InstanceId};
use crate::pill::{Borrowed, PoisonPill};

struct Slots<H> {
    available: VecDeque<Instance<H>>,
    registered: BTreeSet<InstanceId>,
    pill: Option<PoisonPill<H>>,
}

/// Fixed-capacity registry of interpreter instances.
pub struct Registry<H> {
    capacity: usize,
    slots: Mutex<Slots<H>>,
    changed: Notify,
}

impl<H> Registry<H> {
    /// Create an empty registry with room for `capacity` instances.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(Slots {
                available: VecDeque::with_capacity(capacity),
                registered: BTreeSet::new(),
                pill: None,
            }),
            changed: Notify::new(),
        }
    }

    /// Declared capacity. Never changes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not yet taken by a registered instance.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity
            .saturating_sub(self.slots.lock().registered.len())
    }

    /// Number of registered instances, borrowed or not.
    pub fn registered_element_count(&self) -> usize {
        self.slots.lock().registered.len()
    }

    /// Ids of every registered instance, in ascending order.
    pub fn registered_ids(&self) -> Vec<InstanceId> {
        self.slots.lock().registered.iter().copied().collect()
    }

    /// Number of instances sitting in the registry ready to borrow.
    pub fn available_count(&self) -> usize {
        self.slots.lock().available.len()
    }

    /// The pill currently installed, if any.
    pub fn pill(&self) -> Option<PoisonPill<H>> {
        self.slots.lock().pill.clone()
    }

    /// Register a freshly created instance and make it available.
    ///
    /// On rejection the instance is handed back so the caller can clean it up.
    #[allow(clippy::result_large_err)]
    pub fn register(&self, instance: Instance<H>) -> std::result::Result<(), (Error, Instance<H>)> {
        {
            let mut slots = self.slots.lock();
            if slots.pill.is_some() {
                return Err((Error::RegistryPoisoned, instance));
            }
            if slots.registered.len() >= self.capacity {
                return Err((
                    Error::RegistryFull {
                        capacity: self.capacity,
                    },
                    instance,
                ));
            }
            if !slots.registered.insert(instance.id()) {
                let id = instance.id();
                return Err((
                    Error::internal(format!("instance {id} is already registered")),
                    instance,
                ));
            }
            slots.available.push_back(instance);
        }
        self.changed.notify_waiters();
        Ok(())
    }

    /// Take an available instance, or the pill, without waiting.
    pub fn try_borrow(&self) -> Option<Borrowed<H>> {
        let mut slots = self.slots.lock();
        if let Some(instance) = slots.available.pop_front() {
            return Some(Borrowed::Instance(instance));
        }
        slots.pill.clone().map(Borrowed::Pill)
    }

    /// Wait for an instance or a pill.
    ///
    /// With `timeout == None` this waits indefinitely.
    pub async fn borrow(&self, timeout: Option<Duration>) -> Result<Borrowed<H>> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register interest before inspecting the slots so a concurrent
            // release between the check and the await is not missed.
            notified.as_mut().enable();

            if let Some(borrowed) = self.try_borrow() {
                return Ok(borrowed);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(Error::BorrowTimeout {
                            timeout_ms: timeout.map_or(0, |t| t.as_millis() as u64),
                        });
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Give a borrowed instance back.
    ///
    /// With `discard` the instance is unregistered and dropped, freeing its
    /// slot; otherwise it becomes available again.
    pub fn release(&self, instance: Instance<H>, discard: bool) -> Result<()> {
        {
            let mut slots = self.slots.lock();
            let id = instance.id();
            if !slots.registered.contains(&id) {
                return Err(Error::UnknownInstance { id });
            }
            if discard {
                slots.registered.remove(&id);
                drop(slots);
                drop(instance);
            } else {
                slots.available.push_back(instance);
            }
        }
        self.changed.notify_waiters();
        Ok(())
    }

    /// Unregister everything and return the instances that were resident.
    ///
    /// Borrowed instances are forgotten; releasing them later fails with
    /// [`Error::UnknownInstance`].
    pub fn clear(&self) -> Vec<Instance<H>> {
        let drained = {
            let mut slots = self.slots.lock();
            slots.registered.clear();
            slots.available.drain(..).collect()
        };
        self.changed.notify_waiters();
        drained
    }

    /// Install a pill handed to borrowers once no instance is available.
    pub fn insert_pill(&self, pill: PoisonPill<H>) {
        self.slots.lock().pill = Some(pill);
        self.changed.notify_waiters();
    }
}

impl<H> std::fmt::Debug for Registry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.lock();
        f.debug_struct("Registry")
            .field("capacity", &self.capacity)
            .field("registered", &slots.registered.len())
            .field("available", &slots.available.len())
            .field("pill", &slots.pill.as_ref().map(PoisonPill::kind))
            .finish()
    }
}
