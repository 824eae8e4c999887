use super::{LoadBalancer, SelectContext};
use crate::Instance;
use dashmap::DashMap;
use skein::rpc::ServiceKey;
use std::collections::HashMap;
use std::sync::Mutex;

/// Smooth weighted round robin.
///
/// Every pick adds each instance's weight to its running score, takes the
/// highest score, and subtracts the total weight from the winner. Over any
/// window of `sum(weights)` picks each instance is chosen `weight` times, and
/// heavy instances are interleaved rather than chosen in bursts. A weight of
/// zero counts as one.
#[derive(Debug, Default)]
pub struct WeightedRoundRobinBalancer {
    /// Running scores per service key, keyed by instance address.
    scores: DashMap<ServiceKey, Mutex<HashMap<String, i64>>>,
}

impl LoadBalancer for WeightedRoundRobinBalancer {
    fn code(&self) -> &'static str {
        "weighted_round_robin"
    }

    fn pick(&self, key: &ServiceKey, candidates: &[Instance], _ctx: &SelectContext<'_>) -> usize {
        let entry = self.scores.entry(key.clone()).or_default();
        let mut scores = entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        // Forget instances that left the set.
        scores.retain(|address, _| candidates.iter().any(|i| &i.address == address));

        let mut total = 0i64;
        let mut best: Option<(usize, i64)> = None;
        for (index, instance) in candidates.iter().enumerate() {
            let weight = i64::from(instance.weight.max(1));
            total += weight;

            let score = scores.entry(instance.address.clone()).or_insert(0);
            *score += weight;

            if best.is_none_or(|(_, top)| *score > top) {
                best = Some((index, *score));
            }
        }

        let (index, _) = best.unwrap_or((0, 0));
        if let Some(score) = scores.get_mut(&candidates[index].address) {
            *score -= total;
        }
        index
    }
}
