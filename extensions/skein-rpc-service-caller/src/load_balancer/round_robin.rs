use super::{LoadBalancer, SelectContext};
use crate::Instance;
use dashmap::DashMap;
use skein::rpc::ServiceKey;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cycles through the instance set with one cursor per service key.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    cursors: DashMap<ServiceKey, AtomicUsize>,
}

impl RoundRobinBalancer {
    fn next(&self, key: &ServiceKey) -> usize {
        if let Some(cursor) = self.cursors.get(key) {
            return cursor.fetch_add(1, Ordering::Relaxed);
        }
        self.cursors
            .entry(key.clone())
            .or_default()
            .fetch_add(1, Ordering::Relaxed)
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn code(&self) -> &'static str {
        "round_robin"
    }

    fn pick(&self, key: &ServiceKey, candidates: &[Instance], _ctx: &SelectContext<'_>) -> usize {
        self.next(key) % candidates.len()
    }
}
