use crate::InvokerRegistry;
use skein::rpc::{RpcError, RpcRequest, RpcResponse};
use skein_rpc_service::{FilterSet, FilterTerminal};
use std::sync::Arc;

/// Routes decoded requests to registered invokers.
///
/// This is the server-side terminal of the filter chain. It never answers with
/// anything but a classified result: an unknown service becomes
/// `ServiceNotFound`, and every dispatch failure keeps its own kind.
#[derive(Clone)]
pub struct ServiceDispatcher {
    registry: Arc<InvokerRegistry>,
}

impl ServiceDispatcher {
    pub fn new(registry: Arc<InvokerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<InvokerRegistry> {
        &self.registry
    }

    /// Runs `request` through `filters` and this dispatcher, always producing
    /// a well-formed response for the request's correlation ID.
    pub async fn handle(&self, filters: &FilterSet, request: RpcRequest) -> RpcResponse {
        let correlation_id = request.correlation_id;
        let signature = request.signature();

        match filters.execute(request, self).await {
            Ok(mut response) => {
                response.correlation_id = correlation_id;
                response
            }
            Err(err) => {
                tracing::debug!(correlation_id, %signature, error = %err, "Request failed");
                RpcResponse::failure(correlation_id, &err)
            }
        }
    }
}

#[async_trait::async_trait]
impl FilterTerminal for ServiceDispatcher {
    async fn invoke(&self, request: RpcRequest) -> Result<RpcResponse, RpcError> {
        let key = request.service_key();
        let invoker = self
            .registry
            .get_invoker(&key)
            .ok_or_else(|| RpcError::ServiceNotFound(key.to_string()))?;

        let payload = invoker
            .invoke(
                &request.method_name,
                &request.param_types,
                &request.param_values,
            )
            .await?;

        Ok(RpcResponse::success(request.correlation_id, payload))
    }
}
