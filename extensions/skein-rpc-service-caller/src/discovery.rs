use crate::Instance;
use dashmap::DashMap;
use skein::rpc::{RpcError, ServiceKey};
use std::time::{Duration, Instant};

/// Source of the live instance set for a service.
///
/// Implementations only report; the caller never writes back.
#[async_trait::async_trait]
pub trait ServiceDiscovery: Send + Sync {
    async fn resolve(&self, key: &ServiceKey) -> Result<Vec<Instance>, RpcError>;
}

/// In-memory discovery for tests and fixed deployments.
///
/// Unknown keys resolve to an empty list.
#[derive(Default)]
pub struct StaticDiscovery {
    services: DashMap<ServiceKey, Vec<Instance>>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_instance(self, key: ServiceKey, instance: Instance) -> Self {
        self.add_instance(key, instance);
        self
    }

    /// Adds an instance, replacing any with the same address.
    pub fn add_instance(&self, key: ServiceKey, instance: Instance) {
        let mut instances = self.services.entry(key).or_default();
        instances.retain(|existing| existing.address != instance.address);
        instances.push(instance);
    }

    /// Returns `true` if an instance was removed.
    pub fn remove_instance(&self, key: &ServiceKey, address: &str) -> bool {
        match self.services.get_mut(key) {
            Some(mut instances) => {
                let before = instances.len();
                instances.retain(|existing| existing.address != address);
                before != instances.len()
            }
            None => false,
        }
    }

    pub fn set_instances(&self, key: ServiceKey, instances: Vec<Instance>) {
        self.services.insert(key, instances);
    }
}

#[async_trait::async_trait]
impl ServiceDiscovery for StaticDiscovery {
    async fn resolve(&self, key: &ServiceKey) -> Result<Vec<Instance>, RpcError> {
        Ok(self
            .services
            .get(key)
            .map(|instances| instances.clone())
            .unwrap_or_default())
    }
}

struct CacheEntry {
    instances: Vec<Instance>,
    fetched_at: Instant,
}

/// Wraps another discovery source and reuses its answers for `ttl`.
pub struct CachingDiscovery<D> {
    inner: D,
    ttl: Duration,
    cache: DashMap<ServiceKey, CacheEntry>,
}

impl<D: ServiceDiscovery> CachingDiscovery<D> {
    pub fn new(inner: D, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: DashMap::new(),
        }
    }

    pub fn invalidate(&self, key: &ServiceKey) {
        self.cache.remove(key);
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

#[async_trait::async_trait]
impl<D: ServiceDiscovery> ServiceDiscovery for CachingDiscovery<D> {
    async fn resolve(&self, key: &ServiceKey) -> Result<Vec<Instance>, RpcError> {
        if let Some(entry) = self.cache.get(key) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.instances.clone());
            }
        }

        let instances = self.inner.resolve(key).await?;
        self.cache.insert(
            key.clone(),
            CacheEntry {
                instances: instances.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(instances)
    }
}
