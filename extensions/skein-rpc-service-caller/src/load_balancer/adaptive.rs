use super::{LeastActiveBalancer, LoadBalancer, SelectContext, random_index};
use crate::Instance;
use skein::rpc::ServiceKey;

/// Scores instances by recent latency, error rate, and load.
///
/// `score = latency_ewma_ms * (1 + 4 * error_rate) * (active + 1)`, lowest
/// wins. Until every candidate has at least one latency sample the pick falls
/// back to least-active, which also gives fresh instances traffic.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdaptiveBalancer;

const ERROR_PENALTY: f64 = 4.0;

impl LoadBalancer for AdaptiveBalancer {
    fn code(&self) -> &'static str {
        "adaptive"
    }

    fn pick(&self, _key: &ServiceKey, candidates: &[Instance], ctx: &SelectContext<'_>) -> usize {
        let Some(metrics) = ctx.metrics else {
            return LeastActiveBalancer::pick_least_active(candidates, ctx);
        };

        let mut scores = Vec::with_capacity(candidates.len());
        for instance in candidates {
            let Some(snapshot) = metrics.snapshot(&instance.address) else {
                return LeastActiveBalancer::pick_least_active(candidates, ctx);
            };
            let Some(latency) = snapshot.latency_ewma else {
                return LeastActiveBalancer::pick_least_active(candidates, ctx);
            };

            let latency_ms = latency.as_secs_f64() * 1_000.0;
            let score = latency_ms.max(0.001)
                * (1.0 + ERROR_PENALTY * snapshot.error_rate())
                * (snapshot.active as f64 + 1.0);
            scores.push(score);
        }

        let best = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let tied: Vec<usize> = scores
            .iter()
            .enumerate()
            .filter(|(_, score)| **score <= best)
            .map(|(index, _)| index)
            .collect();

        match tied.len() {
            0 => 0,
            1 => tied[0],
            n => tied[random_index(n)],
        }
    }
}
