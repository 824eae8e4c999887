use skein::rpc::{RpcError, RpcRequest, RpcResponse, RpcResultStatus, ServiceKey};
use skein_rpc_service::{
    BitcodeCodec, Codec, Filter, FilterChain, FilterSet, LoggingFilter, MethodArgs,
};
use skein_rpc_service_endpoint::{InvokerRegistry, ServiceDispatcher, ServiceInvoker};
use std::sync::Arc;

fn greeter(greeting: &'static str) -> ServiceInvoker {
    ServiceInvoker::builder(BitcodeCodec)
        .method("greet", move |(name,): (String,)| {
            Ok::<_, String>(format!("{greeting}, {name}"))
        })
        .build()
}

fn greet_request(version: &str, correlation_id: u32) -> RpcRequest {
    let args = ("ada".to_string(),);
    RpcRequest::new(&ServiceKey::new("Greeter", version), "greet")
        .with_params(
            <(String,)>::param_types(),
            args.encode(&BitcodeCodec).unwrap(),
        )
        .with_correlation_id(correlation_id)
}

fn decode_greeting(response: RpcResponse) -> String {
    BitcodeCodec
        .deserialize(&response.into_result().unwrap())
        .unwrap()
}

#[test]
fn test_registry_operations() {
    let registry = InvokerRegistry::new();
    let v1 = ServiceKey::new("Greeter", "1.0.0");
    let v2 = ServiceKey::new("Greeter", "2.0.0");

    assert!(registry.register_invoker(v1.clone(), greeter("hi")).is_none());
    assert!(registry.register_invoker(v2.clone(), greeter("hey")).is_none());
    assert_eq!(registry.count(), 2);
    assert!(registry.contains_service(&v1));
    assert_eq!(registry.keys(), vec![v1.clone(), v2.clone()]);

    assert!(registry.remove_invoker(&v1).is_some());
    assert!(registry.remove_invoker(&v1).is_none());
    assert!(registry.get_invoker(&v1).is_none());
    assert!(registry.get_invoker(&v2).is_some());

    registry.clear();
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn test_reregistering_replaces_the_invoker() {
    let registry = Arc::new(InvokerRegistry::new());
    let key = ServiceKey::new("Greeter", "1.0.0");
    let dispatcher = ServiceDispatcher::new(registry.clone());

    registry.register_invoker(key.clone(), greeter("hello"));
    let before = dispatcher
        .handle(&FilterSet::new(), greet_request("1.0.0", 1))
        .await;

    assert!(registry.register_invoker(key, greeter("howdy")).is_some());
    let after = dispatcher
        .handle(&FilterSet::new(), greet_request("1.0.0", 2))
        .await;

    assert_eq!(registry.count(), 1);
    assert_eq!(decode_greeting(before), "hello, ada");
    assert_eq!(decode_greeting(after), "howdy, ada");
}

#[tokio::test]
async fn test_unknown_version_is_service_not_found() {
    let registry = Arc::new(InvokerRegistry::new());
    registry.register_invoker(ServiceKey::new("Greeter", "2.0.0"), greeter("hi"));
    let dispatcher = ServiceDispatcher::new(registry);

    let response = dispatcher
        .handle(&FilterSet::new(), greet_request("1.0.0", 42))
        .await;

    assert_eq!(response.correlation_id, 42);
    assert_eq!(response.status, RpcResultStatus::ServiceNotFound);
    assert!(matches!(
        response.into_result(),
        Err(RpcError::ServiceNotFound(detail)) if detail == "Greeter:1.0.0"
    ));
}

struct DenyAll;

#[async_trait::async_trait]
impl Filter for DenyAll {
    fn name(&self) -> &str {
        "deny-all"
    }

    async fn filter(
        &self,
        _request: RpcRequest,
        _chain: FilterChain<'_>,
    ) -> Result<RpcResponse, RpcError> {
        Err(RpcError::FilterRejected("not allowed".into()))
    }
}

#[tokio::test]
async fn test_server_filters_wrap_dispatch() {
    let registry = Arc::new(InvokerRegistry::new());
    registry.register_invoker(ServiceKey::new("Greeter", "1.0.0"), greeter("hi"));
    let dispatcher = ServiceDispatcher::new(registry);

    let logged = FilterSet::new().with(LoggingFilter::default());
    let ok = dispatcher.handle(&logged, greet_request("1.0.0", 5)).await;
    assert_eq!(decode_greeting(ok), "hi, ada");

    let denied = FilterSet::new()
        .with(LoggingFilter::default())
        .with(DenyAll);
    let response = dispatcher.handle(&denied, greet_request("1.0.0", 6)).await;
    assert_eq!(response.correlation_id, 6);
    assert_eq!(response.status, RpcResultStatus::FilterRejected);
    assert_eq!(response.error_message.as_deref(), Some("not allowed"));
}

#[tokio::test]
async fn test_concurrent_lookups_during_registration() {
    let registry = Arc::new(InvokerRegistry::new());
    let dispatcher = ServiceDispatcher::new(registry.clone());
    registry.register_invoker(ServiceKey::new("Greeter", "1.0.0"), greeter("hi"));

    let writer = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                registry.register_invoker(
                    ServiceKey::new("Other", format!("{i}.0.0")),
                    greeter("other"),
                );
                tokio::task::yield_now().await;
            }
        })
    };

    for id in 0..50 {
        let response = dispatcher
            .handle(&FilterSet::new(), greet_request("1.0.0", id))
            .await;
        assert!(response.is_success());
        tokio::task::yield_now().await;
    }

    writer.await.unwrap();
    assert_eq!(registry.count(), 51);
}
