use crate::constants::LATENCY_EWMA_ALPHA;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct AddressStats {
    active: AtomicUsize,
    succeeded: AtomicU64,
    failed: AtomicU64,
    /// Moving average of call latency in microseconds; `None` until the
    /// first sample.
    latency_ewma_us: Mutex<Option<f64>>,
}

impl AddressStats {
    fn record(&self, elapsed: Duration, success: bool) {
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        let sample = elapsed.as_secs_f64() * 1_000_000.0;
        let mut ewma = self
            .latency_ewma_us
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *ewma = Some(match *ewma {
            Some(prev) => LATENCY_EWMA_ALPHA * sample + (1.0 - LATENCY_EWMA_ALPHA) * prev,
            None => sample,
        });
    }
}

/// A point-in-time view of one address's call statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AddressSnapshot {
    pub active: usize,
    pub succeeded: u64,
    pub failed: u64,
    pub latency_ewma: Option<Duration>,
}

impl AddressSnapshot {
    pub fn error_rate(&self) -> f64 {
        let total = self.succeeded + self.failed;
        if total == 0 {
            0.0
        } else {
            self.failed as f64 / total as f64
        }
    }
}

/// Per-address call statistics read by the load-aware strategies.
#[derive(Default)]
pub struct CallMetrics {
    by_address: DashMap<String, Arc<AddressStats>>,
}

impl CallMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn stats(&self, address: &str) -> Arc<AddressStats> {
        if let Some(stats) = self.by_address.get(address) {
            return stats.clone();
        }
        self.by_address
            .entry(address.to_string())
            .or_default()
            .clone()
    }

    /// Marks a call to `address` as in flight until the guard is dropped.
    pub fn begin(&self, address: &str) -> ActiveCallGuard {
        let stats = self.stats(address);
        stats.active.fetch_add(1, Ordering::Relaxed);
        ActiveCallGuard {
            stats,
            started: Instant::now(),
        }
    }

    pub fn active(&self, address: &str) -> usize {
        self.by_address
            .get(address)
            .map(|stats| stats.active.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self, address: &str) -> Option<AddressSnapshot> {
        let stats = self.by_address.get(address)?;
        let latency = *stats
            .latency_ewma_us
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        Some(AddressSnapshot {
            active: stats.active.load(Ordering::Relaxed),
            succeeded: stats.succeeded.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            latency_ewma: latency.map(|us| Duration::from_micros(us as u64)),
        })
    }
}

/// Holds one unit of an address's active count.
///
/// Dropping the guard without calling [`finish`](Self::finish) (for example
/// when the calling future is cancelled) still releases the active count but
/// records no sample.
pub struct ActiveCallGuard {
    stats: Arc<AddressStats>,
    started: Instant,
}

impl ActiveCallGuard {
    pub fn finish(self, success: bool) {
        self.stats.record(self.started.elapsed(), success);
    }
}

impl Drop for ActiveCallGuard {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_tracks_active_calls() {
        let metrics = CallMetrics::new();

        let first = metrics.begin("a:1");
        let second = metrics.begin("a:1");
        assert_eq!(metrics.active("a:1"), 2);

        first.finish(true);
        assert_eq!(metrics.active("a:1"), 1);

        drop(second);
        let snapshot = metrics.snapshot("a:1").unwrap();
        assert_eq!(snapshot.active, 0);
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.failed, 0);
        assert!(snapshot.latency_ewma.is_some());
    }

    #[test]
    fn test_error_rate() {
        let metrics = CallMetrics::new();
        metrics.begin("b:1").finish(true);
        metrics.begin("b:1").finish(false);
        metrics.begin("b:1").finish(false);
        metrics.begin("b:1").finish(true);

        assert_eq!(metrics.snapshot("b:1").unwrap().error_rate(), 0.5);
        assert_eq!(metrics.active("unknown:1"), 0);
        assert!(metrics.snapshot("unknown:1").is_none());
    }
}
