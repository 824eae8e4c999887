//! Instance selection strategies.
//!
//! Each strategy implements [`LoadBalancer`]. Strategies are addressed by a
//! string code so a client can pick one from configuration:
//!
//! ```rust
//! use skein_rpc_service_caller::LoadBalancerRegistry;
//!
//! let registry = LoadBalancerRegistry::new();
//! let balancer = registry.create("round_robin").unwrap();
//! assert_eq!(balancer.code(), "round_robin");
//! assert!(registry.create("fastest").is_err());
//! ```

mod adaptive;
pub use adaptive::AdaptiveBalancer;

mod consistent_hash;
pub use consistent_hash::ConsistentHashBalancer;

mod least_active;
pub use least_active::LeastActiveBalancer;

mod random;
pub use random::RandomBalancer;

mod round_robin;
pub use round_robin::RoundRobinBalancer;

mod weighted_round_robin;
pub use weighted_round_robin::WeightedRoundRobinBalancer;

use crate::{CallMetrics, Instance};
use rand::Rng;
use skein::rpc::{RpcError, ServiceKey};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-call inputs a strategy may consult.
#[derive(Clone, Copy)]
pub struct SelectContext<'a> {
    /// Routing key for consistent hashing.
    pub hash_key: Option<&'a [u8]>,
    pub metrics: Option<&'a CallMetrics>,
}

impl<'a> SelectContext<'a> {
    pub fn new() -> Self {
        Self {
            hash_key: None,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_hash_key(mut self, hash_key: &'a [u8]) -> Self {
        self.hash_key = Some(hash_key);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: &'a CallMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn active(&self, address: &str) -> usize {
        self.metrics.map(|m| m.active(address)).unwrap_or(0)
    }
}

impl Default for SelectContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks one instance out of a discovered set.
///
/// Implementations must tolerate concurrent `select` calls for the same key.
pub trait LoadBalancer: Send + Sync {
    /// Unique configuration code of the strategy.
    fn code(&self) -> &'static str;

    /// Returns an index into `candidates`, which is never empty.
    fn pick(&self, key: &ServiceKey, candidates: &[Instance], ctx: &SelectContext<'_>) -> usize;

    /// Selects among the healthy members of `instances`.
    fn select(
        &self,
        key: &ServiceKey,
        instances: &[Instance],
        ctx: &SelectContext<'_>,
    ) -> Result<Instance, RpcError> {
        let candidates: Vec<Instance> = instances.iter().filter(|i| i.healthy).cloned().collect();
        if candidates.is_empty() {
            return Err(RpcError::NoAvailableInstance(key.to_string()));
        }

        let index = self.pick(key, &candidates, ctx).min(candidates.len() - 1);
        Ok(candidates[index].clone())
    }
}

pub(crate) fn random_index(len: usize) -> usize {
    rand::rng().random_range(0..len)
}

/// The built-in strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadBalanceStrategy {
    Random,
    RoundRobin,
    WeightedRoundRobin,
    ConsistentHash,
    LeastActive,
    Adaptive,
}

impl LoadBalanceStrategy {
    pub const ALL: [LoadBalanceStrategy; 6] = [
        LoadBalanceStrategy::Random,
        LoadBalanceStrategy::RoundRobin,
        LoadBalanceStrategy::WeightedRoundRobin,
        LoadBalanceStrategy::ConsistentHash,
        LoadBalanceStrategy::LeastActive,
        LoadBalanceStrategy::Adaptive,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            LoadBalanceStrategy::Random => "random",
            LoadBalanceStrategy::RoundRobin => "round_robin",
            LoadBalanceStrategy::WeightedRoundRobin => "weighted_round_robin",
            LoadBalanceStrategy::ConsistentHash => "consistent_hash",
            LoadBalanceStrategy::LeastActive => "least_active",
            LoadBalanceStrategy::Adaptive => "adaptive",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, RpcError> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.code() == code)
            .ok_or_else(|| RpcError::UnknownStrategy(code.to_string()))
    }

    pub fn build(&self) -> Arc<dyn LoadBalancer> {
        match self {
            LoadBalanceStrategy::Random => Arc::new(RandomBalancer),
            LoadBalanceStrategy::RoundRobin => Arc::new(RoundRobinBalancer::default()),
            LoadBalanceStrategy::WeightedRoundRobin => {
                Arc::new(WeightedRoundRobinBalancer::default())
            }
            LoadBalanceStrategy::ConsistentHash => Arc::new(ConsistentHashBalancer::default()),
            LoadBalanceStrategy::LeastActive => Arc::new(LeastActiveBalancer),
            LoadBalanceStrategy::Adaptive => Arc::new(AdaptiveBalancer),
        }
    }
}

pub type LoadBalancerFactory = Arc<dyn Fn() -> Arc<dyn LoadBalancer> + Send + Sync>;

/// Strategy factories keyed by code, resolved once at startup.
#[derive(Clone)]
pub struct LoadBalancerRegistry {
    factories: HashMap<String, LoadBalancerFactory>,
}

impl Default for LoadBalancerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancerRegistry {
    /// A registry holding every built-in strategy.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        for strategy in LoadBalanceStrategy::ALL {
            registry.register(strategy.code(), move || strategy.build());
        }
        registry
    }

    /// Adds (or replaces) a strategy under `code`.
    pub fn register<F>(&mut self, code: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn LoadBalancer> + Send + Sync + 'static,
    {
        self.factories.insert(code.into(), Arc::new(factory));
    }

    pub fn create(&self, code: &str) -> Result<Arc<dyn LoadBalancer>, RpcError> {
        self.factories
            .get(code)
            .map(|factory| factory())
            .ok_or_else(|| RpcError::UnknownStrategy(code.to_string()))
    }

    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.factories.keys().cloned().collect();
        codes.sort();
        codes
    }
}
