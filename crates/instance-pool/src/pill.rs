//! Poison pills: sentinels placed in a registry instead of real instances.
//!
//! A registry hands its pill to every borrower once no real instance is
//! available, so a borrower branches on [`Borrowed`] rather than blocking
//! on a registry that will never be replenished.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::Error;
use crate::instance::Instance;
use crate::registry::Registry;

/// Signal carried by a registry in place of an instance.
pub enum PoisonPill<H> {
    /// Constructing one or more instances failed; the pool is unusable.
    Failure(Arc<Error>),
    /// The registry was swapped out; borrow again from the superseding one.
    Retry(Arc<Registry<H>>),
    /// The registry only exists to be drained once at shutdown.
    Shutdown(Weak<Registry<H>>),
}

impl<H> PoisonPill<H> {
    /// Build a failure pill from its cause.
    pub fn failure(cause: Error) -> Self {
        Self::Failure(Arc::new(cause))
    }

    /// The error a borrower should surface for this pill.
    ///
    /// A retry pill is not an error for ordinary borrowers; it only maps to
    /// one when a caller (such as a drain) cannot follow it.
    pub fn to_error(&self) -> Error {
        match self {
            Self::Failure(cause) => Error::PoolFailed {
                cause: Arc::clone(cause),
            },
            Self::Retry(_) => Error::internal("registry has already been superseded"),
            Self::Shutdown(_) => Error::ShuttingDown,
        }
    }

    /// Short name of the pill kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Failure(_) => "failure",
            Self::Retry(_) => "retry",
            Self::Shutdown(_) => "shutdown",
        }
    }
}

impl<H> Clone for PoisonPill<H> {
    fn clone(&self) -> Self {
        match self {
            Self::Failure(cause) => Self::Failure(Arc::clone(cause)),
            Self::Retry(registry) => Self::Retry(Arc::clone(registry)),
            Self::Shutdown(registry) => Self::Shutdown(Weak::clone(registry)),
        }
    }
}

impl<H> fmt::Debug for PoisonPill<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failure(cause) => f.debug_tuple("Failure").field(cause).finish(),
            Self::Retry(registry) => f
                .debug_tuple("Retry")
                .field(&registry.capacity())
                .finish(),
            Self::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

/// Outcome of a registry borrow.
pub enum Borrowed<H> {
    /// A real instance, now owned by the borrower.
    Instance(Instance<H>),
    /// The registry's pill; no real instance was available.
    Pill(PoisonPill<H>),
}

impl<H> Borrowed<H> {
    /// The instance, if this borrow yielded one.
    pub fn into_instance(self) -> Option<Instance<H>> {
        match self {
            Self::Instance(instance) => Some(instance),
            Self::Pill(_) => None,
        }
    }

    /// The pill, if this borrow yielded one.
    pub fn into_pill(self) -> Option<PoisonPill<H>> {
        match self {
            Self::Instance(_) => None,
            Self::Pill(pill) => Some(pill),
        }
    }
}

impl<H> fmt::Debug for Borrowed<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(instance) => f.debug_tuple("Instance").field(instance).finish(),
            Self::Pill(pill) => f.debug_tuple("Pill").field(pill).finish(),
        }
    }
}
