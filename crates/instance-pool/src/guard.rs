//! RAII guard for borrowed instances

use crate::instance::{Instance, InstanceId};

type Returner<H> = Box<dyn FnOnce(Instance<H>) + Send>;

/// RAII guard around a borrowed [`Instance`].
///
/// Dropping the guard returns the instance to its pool. Use
/// [`into_inner`](Self::into_inner) to take the instance out instead; the
/// caller then owns returning it.
pub struct InstanceGuard<H> {
    instance: Option<Instance<H>>,
    on_drop: Option<Returner<H>>,
}

impl<H> InstanceGuard<H> {
    /// Wrap `instance`, running `on_drop` with it when the guard is dropped.
    pub fn new<F>(instance: Instance<H>, on_drop: F) -> Self
    where
        F: FnOnce(Instance<H>) + Send + 'static,
    {
        Self {
            instance: Some(instance),
            on_drop: Some(Box::new(on_drop)),
        }
    }

    /// Id of the guarded instance.
    pub fn id(&self) -> InstanceId {
        self.instance().id()
    }

    /// Take the instance out of the guard without returning it.
    #[must_use]
    pub fn into_inner(mut self) -> Instance<H> {
        self.on_drop.take();
        self.instance
            .take()
            .expect("instance guard holds an instance until dropped")
    }

    fn instance(&self) -> &Instance<H> {
        self.instance
            .as_ref()
            .expect("instance guard holds an instance until dropped")
    }
}

impl<H> std::ops::Deref for InstanceGuard<H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.instance().handle()
    }
}

impl<H> std::ops::DerefMut for InstanceGuard<H> {
    fn deref_mut(&mut self) -> &mut H {
        self.instance
            .as_mut()
            .expect("instance guard holds an instance until dropped")
            .handle_mut()
    }
}

impl<H> Drop for InstanceGuard<H> {
    fn drop(&mut self) {
        if let (Some(instance), Some(on_drop)) = (self.instance.take(), self.on_drop.take()) {
            on_drop(instance);
        }
    }
}

impl<H> std::fmt::Debug for InstanceGuard<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceGuard")
            .field("instance", &self.instance)
            .finish()
    }
}
