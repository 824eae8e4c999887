use super::{LoadBalancer, SelectContext, random_index};
use crate::Instance;
use skein::rpc::ServiceKey;

/// Prefers the instance with the fewest in-flight calls; ties are broken at
/// random.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastActiveBalancer;

impl LeastActiveBalancer {
    pub(crate) fn pick_least_active(candidates: &[Instance], ctx: &SelectContext<'_>) -> usize {
        let active: Vec<usize> = candidates.iter().map(|i| ctx.active(&i.address)).collect();
        let fewest = active.iter().copied().min().unwrap_or(0);
        let tied: Vec<usize> = active
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == fewest)
            .map(|(index, _)| index)
            .collect();

        match tied.len() {
            0 => 0,
            1 => tied[0],
            n => tied[random_index(n)],
        }
    }
}

impl LoadBalancer for LeastActiveBalancer {
    fn code(&self) -> &'static str {
        "least_active"
    }

    fn pick(&self, _key: &ServiceKey, candidates: &[Instance], ctx: &SelectContext<'_>) -> usize {
        Self::pick_least_active(candidates, ctx)
    }
}
