use crate::RpcClient;
use serde::de::DeserializeOwned;
use skein::rpc::{CallMetadata, RpcError, RpcRequest, RpcResponse, ServiceKey};
use skein_rpc_service::{Codec, FilterSet, FilterTerminal, MethodArgs};
use skein_rpc_service_caller::{
    CallMetrics, LoadBalanceStrategy, LoadBalancer, LoadBalancerRegistry, SelectContext,
    ServiceDiscovery,
};
use std::sync::Arc;
use std::time::Duration;

/// A typed handle on one remote service version.
///
/// Every call runs the reference's filter chain. The end of the chain
/// resolves instances through discovery, picks one with the load balancer,
/// sends the request with the client, and records the outcome in the call
/// metrics that load-aware strategies read.
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), skein::rpc::RpcError> {
/// use skein::rpc::ServiceKey;
/// use skein_rpc_service::BitcodeCodec;
/// use skein_rpc_service_caller::{Instance, StaticDiscovery};
/// use skein_tokio_rpc_client::{RpcClient, RpcClientConfig, ServiceReference};
/// use std::sync::Arc;
///
/// let key = ServiceKey::new("UserService", "1.0.0");
/// let discovery = StaticDiscovery::new().with_instance(key.clone(), Instance::new("127.0.0.1:8080"));
///
/// let client = Arc::new(RpcClient::websocket(RpcClientConfig::default()));
/// client.start();
///
/// let users = ServiceReference::new(key, client, Arc::new(discovery), BitcodeCodec)
///     .with_strategy("round_robin")?;
/// let name: String = users.call("get_user_name", (7u64,)).await?;
/// # Ok(())
/// # }
/// ```
pub struct ServiceReference<C: Codec> {
    key: ServiceKey,
    client: Arc<RpcClient>,
    discovery: Arc<dyn ServiceDiscovery>,
    balancer: Arc<dyn LoadBalancer>,
    metrics: Arc<CallMetrics>,
    filters: FilterSet,
    codec: C,
    metadata: CallMetadata,
}

impl<C: Codec> ServiceReference<C> {
    pub fn new(
        key: ServiceKey,
        client: Arc<RpcClient>,
        discovery: Arc<dyn ServiceDiscovery>,
        codec: C,
    ) -> Self {
        let metadata = CallMetadata {
            timeout_ms: client.config().call_timeout.as_millis() as u64,
            ..CallMetadata::default()
        };

        Self {
            key,
            client,
            discovery,
            balancer: LoadBalanceStrategy::Random.build(),
            metrics: Arc::new(CallMetrics::new()),
            filters: FilterSet::new(),
            codec,
            metadata,
        }
    }

    /// Selects the load-balancing strategy by code.
    pub fn with_strategy(self, code: &str) -> Result<Self, RpcError> {
        let balancer = LoadBalancerRegistry::new().create(code)?;
        Ok(self.with_load_balancer(balancer))
    }

    #[must_use]
    pub fn with_load_balancer(mut self, balancer: Arc<dyn LoadBalancer>) -> Self {
        self.balancer = balancer;
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Shares call metrics with other references.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<CallMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.metadata.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Metadata every call starts from.
    #[must_use]
    pub fn with_metadata(mut self, metadata: CallMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn metrics(&self) -> &Arc<CallMetrics> {
        &self.metrics
    }

    /// Calls `method` and decodes its result.
    pub async fn call<Args, R>(&self, method: &str, args: Args) -> Result<R, RpcError>
    where
        Args: MethodArgs,
        R: DeserializeOwned,
    {
        self.call_with(method, args, self.metadata.clone()).await
    }

    /// Like [`call`](Self::call) with per-call metadata.
    pub async fn call_with<Args, R>(
        &self,
        method: &str,
        args: Args,
        metadata: CallMetadata,
    ) -> Result<R, RpcError>
    where
        Args: MethodArgs,
        R: DeserializeOwned,
    {
        let payload = self.invoke(method, args, metadata).await?.into_result()?;
        Ok(self.codec.deserialize(&payload)?)
    }

    /// Fire-and-forget call; returns once the request is queued.
    pub async fn notify<Args: MethodArgs>(&self, method: &str, args: Args) -> Result<(), RpcError> {
        let metadata = CallMetadata {
            one_way: true,
            ..self.metadata.clone()
        };
        self.invoke(method, args, metadata).await?.into_result()?;
        Ok(())
    }

    async fn invoke<Args: MethodArgs>(
        &self,
        method: &str,
        args: Args,
        metadata: CallMetadata,
    ) -> Result<RpcResponse, RpcError> {
        let request = RpcRequest::new(&self.key, method)
            .with_params(Args::param_types(), args.encode(&self.codec)?)
            .with_metadata(metadata);

        let remote = RemoteCall {
            client: &self.client,
            discovery: self.discovery.as_ref(),
            balancer: self.balancer.as_ref(),
            metrics: &self.metrics,
        };
        self.filters.execute(request, &remote).await
    }
}

/// End of the client-side chain: discovery, selection, and the network call.
struct RemoteCall<'a> {
    client: &'a RpcClient,
    discovery: &'a dyn ServiceDiscovery,
    balancer: &'a dyn LoadBalancer,
    metrics: &'a CallMetrics,
}

#[async_trait::async_trait]
impl FilterTerminal for RemoteCall<'_> {
    async fn invoke(&self, request: RpcRequest) -> Result<RpcResponse, RpcError> {
        let key = request.service_key();
        let instances = self.discovery.resolve(&key).await?;

        // Route on the explicit hash key, else on the first argument.
        let hash_key = request
            .metadata
            .hash_key
            .as_deref()
            .map(str::as_bytes)
            .or_else(|| request.param_values.first().map(Vec::as_slice));
        let mut ctx = SelectContext::new().with_metrics(self.metrics);
        if let Some(hash_key) = hash_key {
            ctx = ctx.with_hash_key(hash_key);
        }

        let instance = self.balancer.select(&key, &instances, &ctx)?;
        let address = instance.address;

        let guard = self.metrics.begin(&address);
        let result = self.client.send_sync(&address, request).await;
        guard.finish(result.as_ref().is_ok_and(|response| response.is_success()));

        result
    }
}
