//! # Nebula Instance Pool
//!
//! Lifecycle coordination for a fixed-capacity pool of expensive, stateful
//! interpreter instances shared by many concurrent callers.
//!
//! - Borrowers take instances from the current [`Registry`] through a
//!   [`PoolContext`] and give them back afterwards.
//! - Every change to pool membership runs as a task on one of two
//!   [`Agent`]s: the pool agent (priming, flush-and-repopulate, shutdown
//!   flush) and the flush-instance agent (replacing one instance that hit
//!   its borrow limit).
//! - The current [`PoolState`] is swapped atomically; a superseded registry
//!   is left holding a [`PoisonPill`] so nobody waits on it forever.
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use nebula_instance_pool::{InstanceId, Lifecycle, PoolConfig, PoolContext, Result};
//!
//! struct Interpreters;
//!
//! #[async_trait]
//! impl Lifecycle for Interpreters {
//!     type Handle = String;
//!
//!     async fn create(&self, id: InstanceId) -> Result<String> {
//!         Ok(format!("interpreter-{id}"))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let ctx = PoolContext::new(PoolConfig::with_size(2), Interpreters)?;
//! nebula_instance_pool::submit_prime(&ctx)?;
//!
//! let guard = ctx.borrow_guard(None).await?;
//! println!("running on {}", *guard);
//! drop(guard);
//!
//! nebula_instance_pool::shutdown_pool(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod guard;
pub mod instance;
pub mod lifecycle;
pub mod pill;
pub mod registry;
pub mod signal;
pub mod state;
pub mod tasks;

pub use agent::{Agent, ShutdownHandler};
pub use config::{PoolConfig, create_pool_state_from_config};
pub use context::PoolContext;
pub use error::{Error, Result};
pub use events::{EventBus, PoolEvent};
pub use guard::InstanceGuard;
pub use instance::{BorrowLimitHook, Instance, InstanceId, next_instance_id};
pub use lifecycle::Lifecycle;
pub use pill::{Borrowed, PoisonPill};
pub use registry::Registry;
pub use signal::{CompletionSignal, CompletionWaiter, completion_signal};
pub use state::PoolState;
pub use tasks::{
    flush_and_repopulate_pool, flush_instance, flush_pool_for_shutdown, prime_pool,
    send_flush_instance, shutdown_pool, submit_flush_and_repopulate, submit_flush_for_shutdown,
    submit_prime, swap_and_drain_pool,
};
