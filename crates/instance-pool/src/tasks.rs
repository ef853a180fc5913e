//! Pool-mutating operations and their agent submission.
//!
//! The `async fn`s here are the bodies of agent tasks. Whole-pool operations
//! ([`prime_pool`], [`swap_and_drain_pool`], [`flush_and_repopulate_pool`],
//! [`flush_pool_for_shutdown`]) must only run on the pool agent;
//! [`flush_instance`] must only run on the flush-instance agent. The
//! `submit_*` functions queue them correctly and return immediately.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::create_pool_state_from_config;
use crate::context::PoolContext;
use crate::error::{Error, Result};
use crate::events::PoolEvent;
use crate::instance::{BorrowLimitHook, Instance, InstanceId, next_instance_id};
use crate::lifecycle::Lifecycle;
use crate::pill::{Borrowed, PoisonPill};
use crate::registry::Registry;
use crate::signal::{CompletionSignal, completion_signal};
use crate::state::PoolState;

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Queue priming of the current (empty) pool on the pool agent.
pub fn submit_prime<L: Lifecycle>(ctx: &PoolContext<L>) -> Result<()> {
    let task_ctx = ctx.clone();
    ctx.pool_agent()
        .submit(async move { prime_pool(&task_ctx).await })
}

/// Queue replacement of every instance on the pool agent.
pub fn submit_flush_and_repopulate<L: Lifecycle>(ctx: &PoolContext<L>) -> Result<()> {
    let task_ctx = ctx.clone();
    ctx.pool_agent()
        .submit(async move { flush_and_repopulate_pool(&task_ctx).await })
}

/// Queue the shutdown flush on the pool agent; `signal` fires when it ends.
pub fn submit_flush_for_shutdown<L: Lifecycle>(
    ctx: &PoolContext<L>,
    signal: CompletionSignal,
) -> Result<()> {
    let task_ctx = ctx.clone();
    ctx.pool_agent()
        .submit(async move { flush_pool_for_shutdown(&task_ctx, signal).await })
}

/// Drain the pool for shutdown and wait until the drain has finished.
pub async fn shutdown_pool<L: Lifecycle>(ctx: &PoolContext<L>) -> Result<()> {
    let (signal, waiter) = completion_signal();
    submit_flush_for_shutdown(ctx, signal)?;
    waiter.wait().await
}

/// Queue replacement of `instance` on the flush-instance agent.
///
/// The replacement goes into the registry the instance came from, with id
/// [`next_instance_id`] of the old one.
pub fn send_flush_instance<L: Lifecycle>(
    ctx: &PoolContext<L>,
    instance: Instance<L::Handle>,
) -> Result<()> {
    let id = instance.id();
    let registry = instance.registry().ok_or_else(|| {
        Error::internal(format!("registry of instance {id} no longer exists"))
    })?;
    let new_id = next_instance_id(id, ctx.current_state().size);

    debug!(instance_id = %id, replacement_id = %new_id, "queueing instance replacement");
    ctx.emit(|| PoolEvent::InstanceFlushQueued {
        id,
        replacement_id: new_id,
    });

    let task_ctx = ctx.clone();
    ctx.flush_instance_agent().submit(async move {
        flush_instance(&task_ctx, instance, registry, new_id).await
    })
}

/// Hook wired into every instance: queue its replacement when it reaches
/// the borrow limit.
fn borrow_limit_hook<L: Lifecycle>(ctx: &PoolContext<L>) -> BorrowLimitHook<L::Handle> {
    let ctx = ctx.downgrade();
    Arc::new(move |instance| match PoolContext::upgrade(&ctx) {
        Some(ctx) => send_flush_instance(&ctx, instance),
        None => Err(Error::internal("pool context was dropped")),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn create_instance<L: Lifecycle>(
    ctx: &PoolContext<L>,
    registry: &Arc<Registry<L::Handle>>,
    id: InstanceId,
    hook: &BorrowLimitHook<L::Handle>,
) -> Result<()> {
    let handle = ctx.lifecycle().create(id).await?;
    let instance = Instance::new(id, handle, Arc::downgrade(registry), Arc::clone(hook));

    if let Err((error, rejected)) = registry.register(instance) {
        if let Err(cleanup_error) = ctx.lifecycle().cleanup(id, rejected.handle()).await {
            warn!(instance_id = %id, error = %cleanup_error, "cleanup of rejected instance failed");
        }
        return Err(error);
    }

    debug!(instance_id = %id, "created instance");
    ctx.emit(|| PoolEvent::InstanceCreated { id });
    Ok(())
}

/// Clear `registry`, leave a failure pill in it, and clean up whatever was
/// resident.
async fn poison<L: Lifecycle>(ctx: &PoolContext<L>, registry: &Registry<L::Handle>, cause: &Error) {
    let resident = registry.clear();
    registry.insert_pill(PoisonPill::failure(cause.clone()));
    warn!(%cause, discarded = resident.len(), "pool registry poisoned");

    for instance in resident {
        if let Err(error) = ctx.lifecycle().cleanup(instance.id(), instance.handle()).await {
            warn!(instance_id = %instance.id(), %error, "cleanup of discarded instance failed");
        }
    }
    ctx.emit(|| PoolEvent::PoolPoisoned {
        error: cause.to_string(),
    });
}

fn reject_if_shut_down<H>(state: &PoolState<H>) -> Result<()> {
    match state.registry.pill() {
        Some(PoisonPill::Shutdown(_)) => {
            warn!("pool has been drained for shutdown; ignoring request");
            Err(Error::ShuttingDown)
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Pool agent tasks
// ---------------------------------------------------------------------------

/// Fill the current registry up to its capacity with ids `1..=capacity`.
///
/// On a creation failure the registry is cleared, poisoned with a failure
/// pill, and the error is returned. After a shutdown flush this fails with
/// [`Error::ShuttingDown`].
pub async fn prime_pool<L: Lifecycle>(ctx: &PoolContext<L>) -> Result<()> {
    let state = ctx.current_state();
    reject_if_shut_down(&state)?;
    let count = state.registry.remaining_capacity();
    info!(count, "priming pool");

    let hook = borrow_limit_hook(ctx);
    for slot in 1..=count {
        let id = InstanceId::new(slot as u64);
        if let Err(error) = create_instance(ctx, &state.registry, id, &hook).await {
            poison(ctx, &state.registry, &error).await;
            return Err(error);
        }
    }

    info!(pool_size = count, "pool primed");
    ctx.emit(|| PoolEvent::PoolPrimed { size: count });
    Ok(())
}

/// Make `new` current, then retire every instance of `old`.
///
/// Each old instance is borrowed back (waiting as long as it takes), cleaned
/// up, and with `refill` replaced by a same-id instance in `new`. Afterwards
/// `old` receives a retry pill so borrowers still waiting on it move to the
/// current pool. Any failure aborts the drain; with `refill` the new
/// registry is poisoned first.
pub async fn swap_and_drain_pool<L: Lifecycle>(
    ctx: &PoolContext<L>,
    old: PoolState<L::Handle>,
    new: PoolState<L::Handle>,
    refill: bool,
) -> Result<()> {
    ctx.swap_state(new.clone());
    ctx.emit(|| PoolEvent::PoolSwapped { size: new.size });
    info!(old_size = old.size, new_size = new.size, refill, "pool swapped; draining previous pool");

    let hook = borrow_limit_hook(ctx);
    let drained = drain(ctx, &old, &new, refill, &hook).await;

    old.registry
        .insert_pill(PoisonPill::Retry(Arc::clone(&new.registry)));

    if let Err(error) = drained {
        if refill {
            poison(ctx, &new.registry, &error).await;
        }
        return Err(error);
    }

    info!(pool_size = old.size, refill, "previous pool drained");
    ctx.emit(|| PoolEvent::PoolDrained {
        size: old.size,
        refilled: refill,
    });
    Ok(())
}

async fn drain<L: Lifecycle>(
    ctx: &PoolContext<L>,
    old: &PoolState<L::Handle>,
    new: &PoolState<L::Handle>,
    refill: bool,
    hook: &BorrowLimitHook<L::Handle>,
) -> Result<()> {
    for _ in 0..old.size {
        let instance = match old.registry.borrow(None).await? {
            Borrowed::Instance(instance) => instance,
            Borrowed::Pill(pill) => return Err(pill.to_error()),
        };
        let id = instance.id();

        let mut outcome = ctx.lifecycle().cleanup(id, instance.handle()).await;
        if outcome.is_ok() {
            ctx.emit(|| PoolEvent::InstanceCleanedUp { id });
            if refill {
                outcome = create_instance(ctx, &new.registry, id, hook).await;
            }
        }
        let released = old.registry.release(instance, true);
        outcome.and(released)?;
        debug!(instance_id = %id, refill, "drained instance");
    }
    Ok(())
}

/// Replace every instance: swap in a fresh pool and refill it while
/// draining the old one.
///
/// A pool already drained for shutdown stays that way: the call fails with
/// [`Error::ShuttingDown`] and nothing is swapped.
pub async fn flush_and_repopulate_pool<L: Lifecycle>(ctx: &PoolContext<L>) -> Result<()> {
    let old = ctx.current_state();
    reject_if_shut_down(&old)?;
    let new = create_pool_state_from_config(ctx.config());
    swap_and_drain_pool(ctx, old, new, true).await
}

/// Retire the pool for good: swap in a pool that only carries a shutdown
/// pill and drain the old one without refilling.
///
/// `signal` is completed exactly once with the outcome.
pub async fn flush_pool_for_shutdown<L: Lifecycle>(
    ctx: &PoolContext<L>,
    signal: CompletionSignal,
) -> Result<()> {
    let outcome = drain_for_shutdown(ctx).await;
    signal.complete(outcome.clone());
    outcome
}

async fn drain_for_shutdown<L: Lifecycle>(ctx: &PoolContext<L>) -> Result<()> {
    let new = create_pool_state_from_config(ctx.config());
    let old = ctx.current_state();

    if !old.is_fully_initialized() {
        return Err(Error::NotInitialized {
            registered: old.registry.registered_element_count(),
            size: old.size,
        });
    }

    new.registry
        .insert_pill(PoisonPill::Shutdown(Arc::downgrade(&new.registry)));
    swap_and_drain_pool(ctx, old, new, false).await?;
    info!("pool drained for shutdown");
    Ok(())
}

// ---------------------------------------------------------------------------
// Flush-instance agent task
// ---------------------------------------------------------------------------

/// Retire `instance` and register a replacement with `new_id` in `registry`.
///
/// Touches no other instance and never changes the current pool state. A
/// cleanup or creation failure poisons `registry`.
pub async fn flush_instance<L: Lifecycle>(
    ctx: &PoolContext<L>,
    instance: Instance<L::Handle>,
    registry: Arc<Registry<L::Handle>>,
    new_id: InstanceId,
) -> Result<()> {
    let old_id = instance.id();
    let hook = instance.borrow_limit_hook();

    let cleaned = ctx.lifecycle().cleanup(old_id, instance.handle()).await;
    registry.release(instance, true)?;

    let replaced = match cleaned {
        Ok(()) => {
            ctx.emit(|| PoolEvent::InstanceCleanedUp { id: old_id });
            create_instance(ctx, &registry, new_id, &hook).await
        }
        Err(error) => Err(error),
    };
    if let Err(error) = replaced {
        poison(ctx, &registry, &error).await;
        return Err(error);
    }

    debug!(instance_id = %old_id, replacement_id = %new_id, "instance replaced");
    Ok(())
}
