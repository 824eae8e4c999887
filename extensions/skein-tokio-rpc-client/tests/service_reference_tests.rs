use serde::{Deserialize, Serialize};
use skein::rpc::{CallMetadata, RpcError, RpcRequest, RpcResponse, ServiceKey};
use skein_rpc_service::{BitcodeCodec, Codec, Filter, FilterChain, FilterSet, JsonCodec};
use skein_rpc_service_caller::{Instance, StaticDiscovery};
use skein_rpc_service_endpoint::ServiceInvoker;
use skein_tokio_rpc_client::{HeartbeatConfig, RpcClient, RpcClientConfig, ServiceReference};
use skein_tokio_rpc_server::{RpcServer, RpcServerConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

fn user_key() -> ServiceKey {
    ServiceKey::new("UserService", "1.0.0")
}

fn user_service(hits: Arc<AtomicUsize>) -> ServiceInvoker {
    ServiceInvoker::builder(BitcodeCodec)
        .method("get_user_by_id", {
            let hits = hits.clone();
            move |(id,): (u64,)| {
                hits.fetch_add(1, Ordering::SeqCst);
                if id == 0 {
                    return Err("no user with id 0".to_string());
                }
                Ok(User {
                    id,
                    name: format!("user-{id}"),
                })
            }
        })
        .method_async("rename", |(user, name): (User, String)| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, String>(User { name, ..user })
        })
        .method_async("slow", |(delay_ms,): (u64,)| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok::<_, String>(delay_ms)
        })
        .method("record_login", move |(_id,): (u64,)| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(())
        })
        .build()
}

struct Fixture {
    servers: Vec<Arc<RpcServer>>,
    addresses: Vec<String>,
    hits: Vec<Arc<AtomicUsize>>,
    client: Arc<RpcClient>,
}

impl Fixture {
    async fn start(server_count: usize) -> Self {
        let mut servers = Vec::new();
        let mut addresses = Vec::new();
        let mut hits = Vec::new();

        for _ in 0..server_count {
            let counter = Arc::new(AtomicUsize::new(0));
            let server = Arc::new(RpcServer::new(RpcServerConfig::default()));
            server.register_service(user_key(), user_service(counter.clone()));
            let port = server.start(0).await.unwrap();
            addresses.push(format!("127.0.0.1:{port}"));
            servers.push(server);
            hits.push(counter);
        }

        let client = Arc::new(RpcClient::websocket(
            RpcClientConfig::default().heartbeat(HeartbeatConfig::disabled()),
        ));
        client.start();

        Self {
            servers,
            addresses,
            hits,
            client,
        }
    }

    fn discovery(&self, key: &ServiceKey) -> Arc<StaticDiscovery> {
        let discovery = StaticDiscovery::new();
        for address in &self.addresses {
            discovery.add_instance(key.clone(), Instance::new(address.clone()));
        }
        Arc::new(discovery)
    }

    fn users(&self) -> ServiceReference<BitcodeCodec> {
        ServiceReference::new(
            user_key(),
            self.client.clone(),
            self.discovery(&user_key()),
            BitcodeCodec,
        )
    }

    fn hits(&self, index: usize) -> usize {
        self.hits[index].load(Ordering::SeqCst)
    }

    async fn stop(self) {
        self.client.shutdown().await;
        for server in self.servers {
            server.shutdown().await;
        }
    }
}

#[tokio::test]
async fn test_sync_call_round_trip() {
    let fixture = Fixture::start(1).await;
    let users = fixture.users();

    let user: User = users.call("get_user_by_id", (7u64,)).await.unwrap();
    assert_eq!(
        user,
        User {
            id: 7,
            name: "user-7".into()
        }
    );

    fixture.stop().await;
}

#[tokio::test]
async fn test_async_method_result_is_materialized() {
    let fixture = Fixture::start(1).await;
    let users = fixture.users();

    let user = User {
        id: 1,
        name: "old".into(),
    };
    let renamed: User = users.call("rename", (user, "new".to_string())).await.unwrap();
    assert_eq!(renamed.name, "new");
    assert_eq!(renamed.id, 1);

    fixture.stop().await;
}

#[tokio::test]
async fn test_concurrent_calls_on_one_connection() {
    let fixture = Fixture::start(1).await;
    let users = Arc::new(fixture.users());

    let calls = (1..=32u64).map(|id| {
        let users = users.clone();
        async move { users.call::<_, User>("get_user_by_id", (id,)).await }
    });
    let results = futures_util::future::join_all(calls).await;

    for (index, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap().id, index as u64 + 1);
    }
    assert_eq!(fixture.hits(0), 32);
    assert_eq!(fixture.client.pending_calls(), 0);

    fixture.stop().await;
}

#[tokio::test]
async fn test_method_failure_reaches_the_caller() {
    let fixture = Fixture::start(1).await;
    let users = fixture.users();

    let result = users.call::<_, User>("get_user_by_id", (0u64,)).await;
    match result {
        Err(RpcError::InvocationTarget(message)) => assert_eq!(message, "no user with id 0"),
        other => panic!("expected an invocation failure, got {other:?}"),
    }

    let result = users.call::<_, User>("delete_user", (1u64,)).await;
    assert!(matches!(result, Err(RpcError::MethodNotFound(_))));

    fixture.stop().await;
}

#[tokio::test]
async fn test_version_mismatch_is_service_not_found() {
    let fixture = Fixture::start(1).await;
    let v2 = ServiceKey::new("UserService", "2.0.0");
    let users = ServiceReference::new(
        v2.clone(),
        fixture.client.clone(),
        fixture.discovery(&v2),
        BitcodeCodec,
    );

    let result = users.call::<_, User>("get_user_by_id", (7u64,)).await;
    match result {
        Err(RpcError::ServiceNotFound(detail)) => assert_eq!(detail, "UserService:2.0.0"),
        other => panic!("expected ServiceNotFound, got {other:?}"),
    }

    fixture.stop().await;
}

#[tokio::test]
async fn test_slow_call_times_out() {
    let fixture = Fixture::start(1).await;
    let users = fixture.users().with_timeout(Duration::from_millis(100));

    let result = users.call::<_, u64>("slow", (1_000u64,)).await;
    assert!(matches!(result, Err(RpcError::Timeout)));

    // The connection is still usable afterwards.
    let fast: u64 = users.call("slow", (1u64,)).await.unwrap();
    assert_eq!(fast, 1);

    fixture.stop().await;
}

#[tokio::test]
async fn test_notify_reaches_the_server() {
    let fixture = Fixture::start(1).await;
    let users = fixture.users();

    users.notify("record_login", (3u64,)).await.unwrap();
    assert_eq!(fixture.client.pending_calls(), 0);

    for _ in 0..100 {
        if fixture.hits(0) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(fixture.hits(0), 1);

    fixture.stop().await;
}

#[tokio::test]
async fn test_round_robin_spreads_calls_across_instances() {
    let fixture = Fixture::start(2).await;
    let users = fixture.users().with_strategy("round_robin").unwrap();

    for id in 1..=6u64 {
        let _: User = users.call("get_user_by_id", (id,)).await.unwrap();
    }
    assert_eq!(fixture.hits(0), 3);
    assert_eq!(fixture.hits(1), 3);

    fixture.stop().await;
}

#[tokio::test]
async fn test_consistent_hash_pins_a_key_to_one_instance() {
    let fixture = Fixture::start(3).await;
    let users = fixture.users().with_strategy("consistent_hash").unwrap();

    for _ in 0..6 {
        let _: User = users.call("get_user_by_id", (42u64,)).await.unwrap();
    }
    let counts: Vec<usize> = (0..3).map(|i| fixture.hits(i)).collect();
    assert_eq!(counts.iter().sum::<usize>(), 6);
    assert!(counts.contains(&6), "calls were spread: {counts:?}");

    fixture.stop().await;
}

#[tokio::test]
async fn test_no_healthy_instance() {
    let fixture = Fixture::start(1).await;
    let discovery = StaticDiscovery::new().with_instance(
        user_key(),
        Instance::new(fixture.addresses[0].clone()).with_health(false),
    );
    let users = ServiceReference::new(
        user_key(),
        fixture.client.clone(),
        Arc::new(discovery),
        BitcodeCodec,
    );

    let result = users.call::<_, User>("get_user_by_id", (1u64,)).await;
    assert!(matches!(result, Err(RpcError::NoAvailableInstance(_))));
    assert_eq!(fixture.hits(0), 0);

    fixture.stop().await;
}

struct DenyUser(u64);

#[async_trait::async_trait]
impl Filter for DenyUser {
    fn name(&self) -> &str {
        "deny_user"
    }

    async fn filter(
        &self,
        request: RpcRequest,
        chain: FilterChain<'_>,
    ) -> Result<RpcResponse, RpcError> {
        let denied = BitcodeCodec.serialize(&self.0)?;
        if request.param_values.first() == Some(&denied) {
            return Err(RpcError::FilterRejected(format!("user {} is blocked", self.0)));
        }
        chain.proceed(request).await
    }
}

#[tokio::test]
async fn test_client_filters_run_before_the_network() {
    let fixture = Fixture::start(1).await;
    let users = fixture
        .users()
        .with_filters(FilterSet::new().with(DenyUser(13)));

    let result = users.call::<_, User>("get_user_by_id", (13u64,)).await;
    assert!(matches!(result, Err(RpcError::FilterRejected(_))));
    assert_eq!(fixture.hits(0), 0);

    let user: User = users.call("get_user_by_id", (14u64,)).await.unwrap();
    assert_eq!(user.id, 14);

    fixture.stop().await;
}

#[tokio::test]
async fn test_json_codec_end_to_end() {
    let server = RpcServer::new(RpcServerConfig::default());
    let key = ServiceKey::new("Greeter", "1.0.0");
    server.register_service(
        key.clone(),
        ServiceInvoker::builder(JsonCodec)
            .method("greet", |(name,): (String,)| Ok::<_, String>(format!("hello, {name}")))
            .build(),
    );
    let port = server.start(0).await.unwrap();

    let client = Arc::new(RpcClient::websocket(RpcClientConfig::default()));
    client.start();
    let discovery =
        StaticDiscovery::new().with_instance(key.clone(), Instance::new(format!("127.0.0.1:{port}")));
    let greeter = ServiceReference::new(key, client.clone(), Arc::new(discovery), JsonCodec);

    let metadata = CallMetadata {
        timeout_ms: 2_000,
        ..CallMetadata::default()
    };
    let greeting: String = greeter
        .call_with("greet", ("ada".to_string(),), metadata)
        .await
        .unwrap();
    assert_eq!(greeting, "hello, ada");

    client.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_server_shutdown_surfaces_as_a_transport_error() {
    let fixture = Fixture::start(1).await;
    let users = fixture.users();

    let _: User = users.call("get_user_by_id", (1u64,)).await.unwrap();
    fixture.servers[0].shutdown().await;

    // Give the client a moment to observe the close.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let result = users.call::<_, User>("get_user_by_id", (2u64,)).await;
    assert!(result.unwrap_err().is_transport());

    fixture.stop().await;
}
