//! Hooks that create and retire interpreter handles.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::instance::InstanceId;

/// Creation and cleanup of the interpreter handles a pool manages.
///
/// The pool never inspects a handle; it only creates it, hands it to
/// borrowers and eventually passes it to [`cleanup`](Lifecycle::cleanup).
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    /// The interpreter resource held by each instance.
    type Handle: Send + Sync + 'static;

    /// Build the interpreter for slot `id`.
    async fn create(&self, id: InstanceId) -> Result<Self::Handle>;

    /// Tear down an interpreter that is leaving the pool.
    async fn cleanup(&self, _id: InstanceId, _handle: &Self::Handle) -> Result<()> {
        Ok(())
    }

    /// Called with every error raised by a pool task.
    ///
    /// A broken pool cannot keep serving, so embedders usually terminate the
    /// process from here. The default only logs.
    fn on_fatal(&self, error: &Error) {
        tracing::error!(%error, "interpreter pool task failed");
    }
}
