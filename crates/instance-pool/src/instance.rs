//! Pool-resident interpreter instances and their id sequencing.

use std::fmt;
use std::sync::{Arc, Weak};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::Registry;

/// Identifier of a pool instance.
///
/// Priming assigns ids `1..=capacity`; replacements advance an id by the
/// pool capacity (see [`next_instance_id`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct InstanceId(u64);

impl InstanceId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for InstanceId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Id for the replacement of `previous` in a pool of `capacity` slots.
///
/// Returns `previous + capacity`, or `(previous + capacity) mod capacity`
/// when the sum would overflow. The wrapped value is not slot-preserving.
#[must_use]
pub fn next_instance_id(previous: InstanceId, capacity: usize) -> InstanceId {
    let capacity = (capacity as u64).max(1);
    match previous.0.checked_add(capacity) {
        Some(next) => InstanceId(next),
        // (previous + capacity) mod capacity == previous mod capacity
        None => InstanceId(previous.0 % capacity),
    }
}

/// Callback run when an instance reaches its borrow limit.
///
/// Takes ownership of the instance; the pool wires this to queue a
/// replacement on the flush-instance agent.
pub type BorrowLimitHook<H> = Arc<dyn Fn(Instance<H>) -> Result<()> + Send + Sync>;

/// A live interpreter handle resident in (or borrowed from) a [`Registry`].
pub struct Instance<H> {
    id: InstanceId,
    handle: H,
    borrow_count: u64,
    origin: Weak<Registry<H>>,
    on_borrow_limit: BorrowLimitHook<H>,
}

impl<H> Instance<H> {
    pub(crate) fn new(
        id: InstanceId,
        handle: H,
        origin: Weak<Registry<H>>,
        on_borrow_limit: BorrowLimitHook<H>,
    ) -> Self {
        Self {
            id,
            handle,
            borrow_count: 0,
            origin,
            on_borrow_limit,
        }
    }

    /// The instance id.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Shared access to the interpreter handle.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Exclusive access to the interpreter handle while borrowed.
    pub fn handle_mut(&mut self) -> &mut H {
        &mut self.handle
    }

    /// Number of completed borrows.
    pub fn borrow_count(&self) -> u64 {
        self.borrow_count
    }

    /// The registry this instance was created for, if it still exists.
    pub fn registry(&self) -> Option<Arc<Registry<H>>> {
        self.origin.upgrade()
    }

    pub(crate) fn record_return(&mut self) -> u64 {
        self.borrow_count += 1;
        self.borrow_count
    }

    pub(crate) fn borrow_limit_hook(&self) -> BorrowLimitHook<H> {
        Arc::clone(&self.on_borrow_limit)
    }
}

impl<H> fmt::Debug for Instance<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("borrow_count", &self.borrow_count)
            .field("origin_alive", &(self.origin.strong_count() > 0))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 3, 4)]
    #[case(2, 3, 5)]
    #[case(5, 3, 8)]
    #[case(1, 1, 2)]
    fn next_id_adds_capacity(#[case] previous: u64, #[case] capacity: usize, #[case] expected: u64) {
        assert_eq!(
            next_instance_id(InstanceId::new(previous), capacity),
            InstanceId::new(expected)
        );
    }

    #[test]
    fn next_id_wraps_on_overflow() {
        let next = next_instance_id(InstanceId::new(u64::MAX - 1), 4);
        assert_eq!(next, InstanceId::new((u64::MAX - 1) % 4));
        assert!(next.get() < 4);
    }

    #[test]
    fn next_id_at_exact_max_does_not_wrap() {
        let next = next_instance_id(InstanceId::new(u64::MAX - 3), 3);
        assert_eq!(next, InstanceId::new(u64::MAX));
    }

    proptest! {
        #[test]
        fn next_id_is_sum_or_bounded_remainder(previous in any::<u64>(), capacity in 1usize..10_000) {
            let next = next_instance_id(InstanceId::new(previous), capacity);
            match previous.checked_add(capacity as u64) {
                Some(sum) => prop_assert_eq!(next.get(), sum),
                None => prop_assert!(next.get() < capacity as u64),
            }
        }
    }
}
