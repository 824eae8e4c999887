use skein::constants::DEFAULT_CALL_TIMEOUT_MS;
use skein_rpc_service_caller::constants::{DEFAULT_MISS_THRESHOLD, DEFAULT_SWEEP_INTERVAL_MS};
use std::time::Duration;

/// Default spacing between heartbeat probes.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    /// Delay between the end of one probe round and the next.
    pub interval: Duration,
    /// Consecutive unanswered probes before the connection is dead.
    pub miss_threshold: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            miss_threshold: DEFAULT_MISS_THRESHOLD,
        }
    }
}

impl HeartbeatConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn miss_threshold(mut self, miss_threshold: u32) -> Self {
        self.miss_threshold = miss_threshold;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcClientConfig {
    /// Deadline given to calls that do not set their own.
    pub call_timeout: Duration,
    pub heartbeat: HeartbeatConfig,
    /// How often overdue calls are swept and failed with `Timeout`.
    pub sweep_interval: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            heartbeat: HeartbeatConfig::default(),
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
        }
    }
}

impl RpcClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    #[must_use]
    pub fn heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}
