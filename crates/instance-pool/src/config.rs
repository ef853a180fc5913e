//! Pool configuration.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::state::PoolState;

/// Configuration for an interpreter pool.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct PoolConfig {
    /// Number of instances in the pool
    pub max_active_instances: usize,
    /// Borrows after which an instance is replaced; `0` disables replacement
    pub max_borrows_per_instance: u64,
    /// Default timeout for borrowing; `None` waits indefinitely
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub borrow_timeout: Option<Duration>,
    /// Capacity of the lifecycle event channel
    pub event_buffer: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            max_active_instances: cpus.saturating_sub(1).clamp(1, 4),
            max_borrows_per_instance: 0,
            borrow_timeout: Some(Duration::from_secs(20 * 60)),
            event_buffer: 1024,
        }
    }
}

impl PoolConfig {
    /// Config for a pool of `size` instances, other settings default.
    #[must_use]
    pub fn with_size(size: usize) -> Self {
        Self {
            max_active_instances: size,
            ..Default::default()
        }
    }

    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_active_instances == 0 {
            return Err(Error::configuration(
                "max_active_instances must be greater than 0",
            ));
        }
        if self.borrow_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::configuration(
                "borrow_timeout must be greater than zero when set",
            ));
        }
        if self.event_buffer == 0 {
            return Err(Error::configuration("event_buffer must be greater than 0"));
        }
        Ok(())
    }
}

/// A fresh, empty pool state sized from `config`.
#[must_use]
pub fn create_pool_state_from_config<H>(config: &PoolConfig) -> PoolState<H> {
    PoolState::new(Registry::new(config.max_active_instances))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_is_valid() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert!((1..=4).contains(&config.max_active_instances));
        assert_eq!(config.max_borrows_per_instance, 0);
    }

    #[rstest]
    #[case(PoolConfig { max_active_instances: 0, ..PoolConfig::default() })]
    #[case(PoolConfig { borrow_timeout: Some(Duration::ZERO), ..PoolConfig::default() })]
    #[case(PoolConfig { event_buffer: 0, ..PoolConfig::default() })]
    fn invalid_configs_are_rejected(#[case] config: PoolConfig) {
        assert!(matches!(config.validate(), Err(Error::Configuration { .. })));
    }

    #[test]
    fn state_from_config_has_declared_capacity() {
        let state = create_pool_state_from_config::<()>(&PoolConfig::with_size(3));
        assert_eq!(state.size, 3);
        assert_eq!(state.registry.remaining_capacity(), 3);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_humantime_durations() {
        let config: PoolConfig = serde_json::from_str(
            r#"{"max_active_instances": 2, "max_borrows_per_instance": 100, "borrow_timeout": "30s"}"#,
        )
        .unwrap();
        assert_eq!(config.max_active_instances, 2);
        assert_eq!(config.max_borrows_per_instance, 100);
        assert_eq!(config.borrow_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.event_buffer, 1024);
    }
}
