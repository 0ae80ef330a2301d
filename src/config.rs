//! [`ReactorConfig`] and its [`ReactorBuilder`].

use std::time::Duration;

/// The default upper bound on how long a single `demultiplex` call may
/// block when no timers are pending, so the loop periodically re-checks
/// its running flag and cross-thread command queue even under an otherwise
/// idle workload.
const DEFAULT_POLL_CEILING: Duration = Duration::from_millis(10);

/// Tunables for a [`Reactor`](crate::reactor::Reactor) or
/// [`MqReactor`](crate::mq_reactor::MqReactor).
#[derive(Clone, Debug)]
pub struct ReactorConfig {
    pub(crate) poll_ceiling: Duration,
    pub(crate) registry_capacity_hint: usize,
}

impl ReactorConfig {
    /// Start building a config with default values.
    pub fn builder() -> ReactorBuilder {
        ReactorBuilder::default()
    }
}

impl Default for ReactorConfig {
    fn default() -> ReactorConfig {
        ReactorConfig {
            poll_ceiling: DEFAULT_POLL_CEILING,
            registry_capacity_hint: 0,
        }
    }
}

/// Builder for [`ReactorConfig`].
#[derive(Clone, Debug, Default)]
pub struct ReactorBuilder {
    config: ReactorConfig,
}

impl ReactorBuilder {
    /// Cap how long a single demultiplex call may block when no timer is
    /// pending. A shorter ceiling makes `stop()` and cross-thread commands
    /// (for `MqReactor`) more responsive at the cost of more frequent
    /// wakeups; the default is 10 milliseconds.
    pub fn poll_ceiling(mut self, ceiling: Duration) -> ReactorBuilder {
        self.config.poll_ceiling = ceiling;
        self
    }

    /// Hint the expected number of concurrently registered handlers, used
    /// to pre-size the registry's backing map.
    pub fn registry_capacity_hint(mut self, capacity: usize) -> ReactorBuilder {
        self.config.registry_capacity_hint = capacity;
        self
    }

    /// Finish building.
    pub fn build(self) -> ReactorConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poll_ceiling_is_ten_millis() {
        let config = ReactorConfig::default();
        assert_eq!(config.poll_ceiling, Duration::from_millis(10));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = ReactorConfig::builder()
            .poll_ceiling(Duration::from_millis(50))
            .registry_capacity_hint(64)
            .build();
        assert_eq!(config.poll_ceiling, Duration::from_millis(50));
        assert_eq!(config.registry_capacity_hint, 64);
    }
}
