//! Shared scripted lifecycle for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use nebula_instance_pool::{Error, InstanceId, Lifecycle, PoolConfig, PoolContext, Result};

/// Stand-in for an interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeInterpreter {
    pub id: InstanceId,
}

/// Everything the lifecycle saw, shared with the test body.
#[derive(Default)]
pub struct Recorder {
    pub created: Mutex<Vec<InstanceId>>,
    pub cleaned: Mutex<Vec<InstanceId>>,
    pub fatal: Mutex<Vec<Error>>,
    pub fail_create: Mutex<HashSet<InstanceId>>,
    pub fail_cleanup: Mutex<HashSet<InstanceId>>,
}

impl Recorder {
    pub fn created(&self) -> Vec<InstanceId> {
        self.created.lock().clone()
    }

    pub fn cleaned(&self) -> Vec<InstanceId> {
        self.cleaned.lock().clone()
    }

    pub fn fatal(&self) -> Vec<Error> {
        self.fatal.lock().clone()
    }

    pub fn fail_create_on(&self, id: u64) {
        self.fail_create.lock().insert(InstanceId::new(id));
    }

    pub fn fail_cleanup_on(&self, id: u64) {
        self.fail_cleanup.lock().insert(InstanceId::new(id));
    }
}

pub struct ScriptedLifecycle {
    pub recorder: Arc<Recorder>,
}

#[async_trait]
impl Lifecycle for ScriptedLifecycle {
    type Handle = FakeInterpreter;

    async fn create(&self, id: InstanceId) -> Result<FakeInterpreter> {
        if self.recorder.fail_create.lock().contains(&id) {
            return Err(Error::creation(id, "scripted creation failure"));
        }
        tokio::task::yield_now().await;
        self.recorder.created.lock().push(id);
        Ok(FakeInterpreter { id })
    }

    async fn cleanup(&self, id: InstanceId, handle: &FakeInterpreter) -> Result<()> {
        assert_eq!(id, handle.id);
        if self.recorder.fail_cleanup.lock().contains(&id) {
            return Err(Error::cleanup(id, "scripted cleanup failure"));
        }
        self.recorder.cleaned.lock().push(id);
        Ok(())
    }

    fn on_fatal(&self, error: &Error) {
        self.recorder.fatal.lock().push(error.clone());
    }
}

pub fn ids(raw: &[u64]) -> Vec<InstanceId> {
    raw.iter().copied().map(InstanceId::new).collect()
}

pub fn pool(config: PoolConfig) -> (PoolContext<ScriptedLifecycle>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let ctx = PoolContext::new(
        config,
        ScriptedLifecycle {
            recorder: Arc::clone(&recorder),
        },
    )
    .expect("valid pool config");
    (ctx, recorder)
}

/// A pool of `size` instances, primed and settled.
pub async fn primed_pool(config: PoolConfig) -> (PoolContext<ScriptedLifecycle>, Arc<Recorder>) {
    let (ctx, recorder) = pool(config);
    nebula_instance_pool::submit_prime(&ctx).unwrap();
    ctx.pool_agent().settled().await.unwrap();
    (ctx, recorder)
}
