//! Long-lived pool handle: configuration, current state and the two agents.

use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::agent::Agent;
use crate::config::{PoolConfig, create_pool_state_from_config};
use crate::error::{Error, Result};
use crate::events::{EventBus, PoolEvent};
use crate::guard::InstanceGuard;
use crate::instance::{Instance, InstanceId};
use crate::lifecycle::Lifecycle;
use crate::pill::{Borrowed, PoisonPill};
use crate::state::PoolState;

pub(crate) struct ContextInner<L: Lifecycle> {
    config: PoolConfig,
    lifecycle: Arc<L>,
    state: ArcSwap<PoolState<L::Handle>>,
    pool_agent: Agent,
    flush_instance_agent: Agent,
    events: EventBus,
}

/// Handle to an interpreter pool.
///
/// Cheap to clone. All membership changes go through one of two agents:
/// the pool agent (priming, flush-and-repopulate, shutdown flush) and the
/// flush-instance agent (replacing a single instance). Keeping them apart
/// lets an instance replacement finish while a drain is waiting for that
/// very instance.
pub struct PoolContext<L: Lifecycle> {
    inner: Arc<ContextInner<L>>,
}

impl<L: Lifecycle> Clone for PoolContext<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: Lifecycle> std::fmt::Debug for PoolContext<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolContext")
            .field("config", &self.inner.config)
            .field("state", &self.current_state())
            .field("events", &self.inner.events)
            .finish_non_exhaustive()
    }
}

impl<L: Lifecycle> PoolContext<L> {
    /// Create a pool context with an empty pool.
    ///
    /// Agent task failures are routed to [`Lifecycle::on_fatal`]. The pool
    /// holds no instances until [`submit_prime`](crate::submit_prime) runs.
    /// Fails with [`Error::Internal`] outside a tokio runtime.
    pub fn new(config: PoolConfig, lifecycle: L) -> Result<Self> {
        config.validate()?;
        let lifecycle = Arc::new(lifecycle);

        let pool_agent = {
            let lifecycle = Arc::clone(&lifecycle);
            Agent::new("pool", move |error| lifecycle.on_fatal(&error))?
        };
        let flush_instance_agent = {
            let lifecycle = Arc::clone(&lifecycle);
            Agent::new("flush-instance", move |error| lifecycle.on_fatal(&error))?
        };

        Ok(Self {
            inner: Arc::new(ContextInner {
                state: ArcSwap::from_pointee(create_pool_state_from_config(&config)),
                events: EventBus::new(config.event_buffer),
                config,
                lifecycle,
                pool_agent,
                flush_instance_agent,
            }),
        })
    }

    pub(crate) fn downgrade(&self) -> Weak<ContextInner<L>> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(inner: &Weak<ContextInner<L>>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// The pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// The lifecycle hooks.
    pub fn lifecycle(&self) -> &L {
        &self.inner.lifecycle
    }

    /// Agent running whole-pool operations.
    pub fn pool_agent(&self) -> &Agent {
        &self.inner.pool_agent
    }

    /// Agent running single-instance replacements.
    pub fn flush_instance_agent(&self) -> &Agent {
        &self.inner.flush_instance_agent
    }

    /// Snapshot of the current pool state.
    pub fn current_state(&self) -> PoolState<L::Handle> {
        PoolState::clone(&self.inner.state.load())
    }

    /// Ids registered in the current pool.
    pub fn registered_ids(&self) -> Vec<InstanceId> {
        self.inner.state.load().registry.registered_ids()
    }

    /// Subscribe to pool lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: impl FnOnce() -> PoolEvent) {
        self.inner.events.publish(event);
    }

    /// Make `next` current in a single store.
    pub(crate) fn swap_state(&self, next: PoolState<L::Handle>) {
        self.inner.state.store(Arc::new(next));
    }

    /// Borrow an instance using the configured borrow timeout.
    pub async fn borrow(&self) -> Result<Instance<L::Handle>> {
        self.borrow_with_timeout(self.inner.config.borrow_timeout)
            .await
    }

    /// Borrow an instance from whichever pool is current.
    ///
    /// A retry pill sends the borrower to the state that superseded the one
    /// it was waiting on. The timeout covers the whole call, retries
    /// included; `None` waits indefinitely.
    pub async fn borrow_with_timeout(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Instance<L::Handle>> {
        let deadline = timeout.map(|timeout| tokio::time::Instant::now() + timeout);
        loop {
            let state = self.inner.state.load_full();
            let remaining =
                deadline.map(|deadline| deadline.saturating_duration_since(tokio::time::Instant::now()));

            let borrowed = state.registry.borrow(remaining).await.map_err(|error| {
                match (error, timeout) {
                    (Error::BorrowTimeout { .. }, Some(timeout)) => Error::BorrowTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                    },
                    (error, _) => error,
                }
            })?;

            match borrowed {
                Borrowed::Instance(instance) => {
                    debug!(instance_id = %instance.id(), "borrowed instance");
                    self.emit(|| PoolEvent::InstanceBorrowed { id: instance.id() });
                    return Ok(instance);
                }
                Borrowed::Pill(PoisonPill::Retry(_)) => {
                    debug!("pool was replaced while waiting; retrying borrow");
                }
                Borrowed::Pill(pill) => return Err(pill.to_error()),
            }
        }
    }

    /// Borrow an instance wrapped in a guard that returns it on drop.
    pub async fn borrow_guard(
        &self,
        timeout: Option<Duration>,
    ) -> Result<InstanceGuard<L::Handle>> {
        let instance = self.borrow_with_timeout(timeout).await?;
        let ctx = self.clone();
        Ok(InstanceGuard::new(instance, move |instance| {
            let id = instance.id();
            if let Err(error) = ctx.return_to_pool(instance) {
                tracing::warn!(instance_id = %id, %error, "failed to return instance on drop");
            }
        }))
    }

    /// Give a borrowed instance back to the registry it came from.
    ///
    /// Once the instance has been borrowed `max_borrows_per_instance` times
    /// it is handed to its borrow-limit hook instead, which queues a
    /// replacement on the flush-instance agent.
    pub fn return_to_pool(&self, mut instance: Instance<L::Handle>) -> Result<()> {
        let borrow_count = instance.record_return();
        self.emit(|| PoolEvent::InstanceReturned {
            id: instance.id(),
            borrow_count,
        });

        let max_borrows = self.inner.config.max_borrows_per_instance;
        if max_borrows > 0 && borrow_count >= max_borrows {
            debug!(
                instance_id = %instance.id(),
                borrow_count,
                "instance reached borrow limit"
            );
            let hook = instance.borrow_limit_hook();
            return hook(instance);
        }

        let registry = instance.registry().ok_or_else(|| {
            Error::internal(format!(
                "registry of instance {} no longer exists",
                instance.id()
            ))
        })?;
        registry.release(instance, false)
    }
}
