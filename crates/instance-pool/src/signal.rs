//! One-shot completion signal for the shutdown flush.

use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Sending half of a completion signal.
///
/// Delivers exactly once: either through [`complete`](Self::complete) or,
/// if the signal is dropped unsent (for example because the task holding it
/// panicked), as an error on drop.
#[derive(Debug)]
pub struct CompletionSignal {
    sender: Option<oneshot::Sender<Result<()>>>,
}

/// Receiving half of a completion signal.
#[derive(Debug)]
pub struct CompletionWaiter {
    receiver: oneshot::Receiver<Result<()>>,
}

/// Create a connected signal/waiter pair.
#[must_use]
pub fn completion_signal() -> (CompletionSignal, CompletionWaiter) {
    let (sender, receiver) = oneshot::channel();
    (
        CompletionSignal {
            sender: Some(sender),
        },
        CompletionWaiter { receiver },
    )
}

impl CompletionSignal {
    /// Deliver `outcome` to the waiter.
    pub fn complete(mut self, outcome: Result<()>) {
        if let Some(sender) = self.sender.take() {
            // The waiter may have given up; nothing to do then.
            let _ = sender.send(outcome);
        }
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Err(Error::internal(
                "completion signal dropped before the operation finished",
            )));
        }
    }
}

impl CompletionWaiter {
    /// Wait for the outcome of the signalled operation.
    pub async fn wait(self) -> Result<()> {
        self.receiver
            .await
            .unwrap_or_else(|_| Err(Error::internal("completion signal lost")))
    }
}
