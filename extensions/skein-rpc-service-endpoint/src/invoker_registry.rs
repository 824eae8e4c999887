use crate::ServiceInvoker;
use dashmap::DashMap;
use skein::rpc::ServiceKey;
use std::sync::Arc;

/// Maps each `ServiceKey` to the invoker serving it.
///
/// Holds at most one invoker per key. Registering an existing key replaces
/// the previous invoker, which lets an implementation be hot-swapped without
/// restarting the server. Writers lock a single shard; readers never wait on
/// writers to unrelated keys.
#[derive(Default)]
pub struct InvokerRegistry {
    invokers: DashMap<ServiceKey, Arc<ServiceInvoker>>,
}

impl InvokerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the invoker that was replaced, if any.
    pub fn register_invoker(
        &self,
        key: ServiceKey,
        invoker: impl Into<Arc<ServiceInvoker>>,
    ) -> Option<Arc<ServiceInvoker>> {
        let previous = self.invokers.insert(key.clone(), invoker.into());
        if previous.is_some() {
            tracing::info!(service = %key, "Replaced service invoker");
        } else {
            tracing::debug!(service = %key, "Registered service invoker");
        }
        previous
    }

    pub fn get_invoker(&self, key: &ServiceKey) -> Option<Arc<ServiceInvoker>> {
        self.invokers.get(key).map(|invoker| invoker.clone())
    }

    pub fn remove_invoker(&self, key: &ServiceKey) -> Option<Arc<ServiceInvoker>> {
        self.invokers.remove(key).map(|(_, invoker)| invoker)
    }

    pub fn contains_service(&self, key: &ServiceKey) -> bool {
        self.invokers.contains_key(key)
    }

    pub fn count(&self) -> usize {
        self.invokers.len()
    }

    pub fn keys(&self) -> Vec<ServiceKey> {
        let mut keys: Vec<ServiceKey> = self.invokers.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.invokers.clear();
    }
}
