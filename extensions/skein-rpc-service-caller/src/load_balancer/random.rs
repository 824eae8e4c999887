use super::{LoadBalancer, SelectContext, random_index};
use crate::Instance;
use skein::rpc::ServiceKey;

/// Uniform random pick.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomBalancer;

impl LoadBalancer for RandomBalancer {
    fn code(&self) -> &'static str {
        "random"
    }

    fn pick(&self, _key: &ServiceKey, candidates: &[Instance], _ctx: &SelectContext<'_>) -> usize {
        random_index(candidates.len())
    }
}
