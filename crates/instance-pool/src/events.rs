//! Event broadcasting for pool lifecycle observability.
//!
//! Provides [`PoolEvent`] variants emitted by pool tasks and borrowers, and
//! an [`EventBus`] backed by `tokio::sync::broadcast`.

use tokio::sync::broadcast;
use tracing::trace;

use crate::instance::InstanceId;

/// Events emitted during pool lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// An instance was created and registered.
    InstanceCreated {
        /// The new instance.
        id: InstanceId,
    },
    /// An instance was passed through the cleanup hook.
    InstanceCleanedUp {
        /// The retired instance.
        id: InstanceId,
    },
    /// A borrower received an instance.
    InstanceBorrowed {
        /// The borrowed instance.
        id: InstanceId,
    },
    /// A borrower gave an instance back.
    InstanceReturned {
        /// The returned instance.
        id: InstanceId,
        /// Completed borrows including this one.
        borrow_count: u64,
    },
    /// An instance hit its borrow limit and a replacement was queued.
    InstanceFlushQueued {
        /// The instance being replaced.
        id: InstanceId,
        /// Id its replacement will get.
        replacement_id: InstanceId,
    },
    /// Priming filled the pool.
    PoolPrimed {
        /// Number of instances created.
        size: usize,
    },
    /// A new pool state became current.
    PoolSwapped {
        /// Size of the new pool.
        size: usize,
    },
    /// Every instance of a superseded pool was retired.
    PoolDrained {
        /// Number of instances drained.
        size: usize,
        /// Whether replacements were created in the new pool.
        refilled: bool,
    },
    /// A registry was cleared and given a failure pill.
    PoolPoisoned {
        /// Human-readable cause.
        error: String,
    },
}

/// Fan-out of [`PoolEvent`]s to every current subscriber.
///
/// Pool tasks hand [`publish`](Self::publish) a closure, so an event is only
/// built when someone is listening. A subscriber that falls more than the
/// configured `event_buffer` behind loses the oldest events.
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    /// Bus holding up to `capacity` undelivered events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::channel(capacity).0,
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Build and send an event if anyone is subscribed.
    pub fn publish(&self, event: impl FnOnce() -> PoolEvent) {
        if self.subscriber_count() == 0 {
            return;
        }
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event()) {
            trace!(?event, "pool event dropped; last subscriber went away");
        }
    }

    /// Receive every event published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
