//! Manager configuration

use portflow_core::constants::DEFAULT_MAX_PORTS;
use std::time::Duration;

/// Configuration for a [`FlowManager`](crate::FlowManager)
#[derive(Debug, Clone)]
pub struct FlowManagerConfig {
    /// Size of the port-id pool
    pub max_ports: usize,

    /// Granularity at which blocked read/write calls re-check their
    /// cancellation token (default: 10ms)
    pub wait_tick: Duration,

    /// How long the teardown worker parks between queue checks when
    /// idle (default: 100ms)
    pub teardown_park_timeout: Duration,
}

impl Default for FlowManagerConfig {
    fn default() -> Self {
        Self {
            max_ports: DEFAULT_MAX_PORTS,
            wait_tick: Duration::from_millis(10),
            teardown_park_timeout: Duration::from_millis(100),
        }
    }
}

impl FlowManagerConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the port-id pool size
    pub fn max_ports(mut self, max_ports: usize) -> Self {
        self.max_ports = max_ports;
        self
    }

    /// Set the cancellation re-check granularity
    pub fn wait_tick(mut self, tick: Duration) -> Self {
        self.wait_tick = tick;
        self
    }

    /// Set the teardown worker park timeout
    pub fn teardown_park_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_park_timeout = timeout;
        self
    }
}
