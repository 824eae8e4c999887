/// How often the client sweeps the pending-call table for overdue calls.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 50;

/// Consecutive unanswered heartbeats before a connection is declared dead.
pub const DEFAULT_MISS_THRESHOLD: u32 = 2;

/// Points each instance occupies on a consistent-hash ring.
pub const CONSISTENT_HASH_VIRTUAL_NODES: usize = 160;

/// Weight given to the newest sample in the latency moving average.
pub const LATENCY_EWMA_ALPHA: f64 = 0.3;
