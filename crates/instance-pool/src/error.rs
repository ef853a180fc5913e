//! Error types for instance pool management
use std::sync::Arc;

use thiserror::Error;

use crate::instance::InstanceId;

/// Result type for instance pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for pool lifecycle operations.
///
/// `Error` is `Clone` so a single failure cause can be handed to every
/// borrower that observes a failure pill.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Pool configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// Creating an interpreter instance failed
    #[error("Failed to create instance {id}: {reason}")]
    Creation {
        /// Id the instance would have been registered under
        id: InstanceId,
        /// The failure reason
        reason: String,
    },

    /// The cleanup hook failed for an instance being retired
    #[error("Failed to clean up instance {id}: {reason}")]
    Cleanup {
        /// The instance identifier
        id: InstanceId,
        /// The failure reason
        reason: String,
    },

    /// A pool was asked to drain before it was fully populated
    #[error("Pool is not fully initialized: {registered}/{size} instances registered")]
    NotInitialized {
        /// Instances currently registered
        registered: usize,
        /// Declared pool size
        size: usize,
    },

    /// The pool was poisoned by a failure pill
    #[error("Pool failed: {cause}")]
    PoolFailed {
        /// What broke the pool
        cause: Arc<Error>,
    },

    /// The pool is draining for shutdown and will never serve again
    #[error("Pool is shutting down")]
    ShuttingDown,

    /// No instance became available before the borrow deadline
    #[error("Timed out after {timeout_ms}ms waiting for an instance")]
    BorrowTimeout {
        /// The timeout in milliseconds
        timeout_ms: u64,
    },

    /// Registration attempted on a registry with no free slot
    #[error("Registry is full: capacity {capacity}")]
    RegistryFull {
        /// Declared registry capacity
        capacity: usize,
    },

    /// Registration attempted on a registry that already holds a pill
    #[error("Registry has been poisoned and accepts no new instances")]
    RegistryPoisoned,

    /// An instance was released to a registry that does not know it
    #[error("Instance {id} is not registered")]
    UnknownInstance {
        /// The instance identifier
        id: InstanceId,
    },

    /// The agent's worker has stopped
    #[error("Agent '{agent}' is no longer accepting tasks")]
    AgentClosed {
        /// Agent name
        agent: &'static str,
    },

    /// A task submitted to an agent panicked
    #[error("Task on agent '{agent}' panicked: {message}")]
    TaskPanicked {
        /// Agent name
        agent: &'static str,
        /// Panic payload, if it was a string
        message: String,
    },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an instance creation error
    pub fn creation<S: Into<String>>(id: InstanceId, reason: S) -> Self {
        Self::Creation {
            id,
            reason: reason.into(),
        }
    }

    /// Create a cleanup error
    pub fn cleanup<S: Into<String>>(id: InstanceId, reason: S) -> Self {
        Self::Cleanup {
            id,
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if a borrower may retry after this error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BorrowTimeout { .. })
    }

    /// Whether this error means the pool can no longer serve instances.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Creation { .. }
                | Self::Cleanup { .. }
                | Self::NotInitialized { .. }
                | Self::PoolFailed { .. }
                | Self::RegistryPoisoned
                | Self::TaskPanicked { .. }
        )
    }
}
