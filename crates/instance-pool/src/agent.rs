//! Serialized task queues for pool-mutating work.
//!
//! An [`Agent`] owns a worker task that pulls submitted futures off an
//! unbounded channel and runs them one at a time, in submission order.
//! Every task runs in its own spawned task so a panic is observed as a
//! [`JoinError`](tokio::task::JoinError); failures and panics both go to the
//! agent's shutdown handler and the worker moves on to the next task.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{Error, Result};

type Task = BoxFuture<'static, Result<()>>;

/// Handler invoked with every error raised by an agent task.
pub type ShutdownHandler = Arc<dyn Fn(Error) + Send + Sync>;

/// A single-threaded FIFO task queue.
///
/// Cloning an `Agent` yields another submitter for the same queue. The
/// worker stops once every clone has been dropped and the queue is empty.
#[derive(Clone)]
pub struct Agent {
    name: &'static str,
    sender: mpsc::UnboundedSender<Task>,
}

impl Agent {
    /// Start an agent whose task failures are passed to `shutdown_handler`.
    ///
    /// The worker is spawned on the current tokio runtime; outside one this
    /// fails with [`Error::Internal`].
    pub fn new<F>(name: &'static str, shutdown_handler: F) -> Result<Self>
    where
        F: Fn(Error) + Send + Sync + 'static,
    {
        let runtime = Handle::try_current().map_err(|error| {
            Error::internal(format!("agent '{name}' needs a tokio runtime: {error}"))
        })?;
        let (sender, receiver) = mpsc::unbounded_channel();
        runtime.spawn(run(name, receiver, Arc::new(shutdown_handler)));
        Ok(Self { name, sender })
    }

    /// Agent name, used in logs and errors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Queue `task` behind everything already submitted. Never blocks.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.sender
            .send(Box::pin(task))
            .map_err(|_| Error::AgentClosed { agent: self.name })
    }

    /// Wait until every task submitted before this call has finished.
    pub async fn settled(&self) -> Result<()> {
        let (done, finished) = oneshot::channel();
        self.submit(async move {
            let _ = done.send(());
            Ok(())
        })?;
        finished
            .await
            .map_err(|_| Error::AgentClosed { agent: self.name })
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

async fn run(
    name: &'static str,
    mut receiver: mpsc::UnboundedReceiver<Task>,
    shutdown_handler: ShutdownHandler,
) {
    debug!(agent = name, "agent started");
    while let Some(task) = receiver.recv().await {
        let outcome = match tokio::spawn(task).await {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                let payload = join_error.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                Err(Error::TaskPanicked {
                    agent: name,
                    message,
                })
            }
            Err(join_error) => Err(Error::internal(format!(
                "task on agent '{name}' was cancelled: {join_error}"
            ))),
        };

        if let Err(error) = outcome {
            warn!(agent = name, %error, "agent task failed");
            shutdown_handler(error);
        }
    }
    debug!(agent = name, "agent stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn recording_agent() -> (Agent, Arc<Mutex<Vec<Error>>>) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let agent = Agent::new("test", move |error| sink.lock().push(error)).unwrap();
        (agent, errors)
    }

    #[test]
    fn new_outside_runtime_fails() {
        let result = Agent::new("orphan", |_| {});
        assert!(matches!(
            result,
            Err(Error::Internal { message }) if message.contains("orphan")
        ));
    }

    #[tokio::test]
    async fn clones_submit_to_the_same_named_queue() {
        let (agent, errors) = recording_agent();
        let other = agent.clone();
        assert_eq!(other.name(), "test");

        other.submit(explode()).unwrap();
        agent.settled().await.unwrap();
        assert_eq!(errors.lock().len(), 1);
    }

    #[tokio::test]
    async fn tasks_run_in_submission_order() {
        let (agent, _) = recording_agent();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5u32 {
            let seen = Arc::clone(&seen);
            agent
                .submit(async move {
                    // Earlier tasks sleep longer; order must still hold.
                    tokio::time::sleep(Duration::from_millis(u64::from(10 - i * 2))).await;
                    seen.lock().push(i);
                    Ok(())
                })
                .unwrap();
        }

        agent.settled().await.unwrap();
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failure_reaches_handler_and_agent_keeps_running() {
        let (agent, errors) = recording_agent();
        agent
            .submit(async { Err::<(), _>(Error::internal("first failed")) })
            .unwrap();

        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        agent
            .submit(async move {
                *flag.lock() = true;
                Ok(())
            })
            .unwrap();

        agent.settled().await.unwrap();
        assert!(*ran.lock());
        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], Error::Internal { message } if message == "first failed"));
    }

    async fn explode() -> Result<()> {
        panic!("interpreter exploded")
    }

    #[tokio::test]
    async fn panic_is_reported_as_task_panicked() {
        let (agent, errors) = recording_agent();
        agent.submit(explode()).unwrap();

        agent.settled().await.unwrap();
        let errors = errors.lock();
        assert!(matches!(
            &errors[0],
            Error::TaskPanicked { agent: "test", message } if message == "interpreter exploded"
        ));
    }
}
