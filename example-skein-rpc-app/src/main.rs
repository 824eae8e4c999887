use example_skein_rpc_app::{User, UserStore, init_tracing, user_service, user_service_key};
use skein::rpc::RpcError;
use skein_rpc_service::{BitcodeCodec, FilterSet, LoggingFilter};
use skein_rpc_service_caller::{Instance, StaticDiscovery};
use skein_tokio_rpc_client::{RpcClient, RpcClientConfig, ServiceReference};
use skein_tokio_rpc_server::{RpcServer, RpcServerConfig};
use std::sync::Arc;
use tokio::join;

#[tokio::main]
async fn main() -> Result<(), RpcError> {
    init_tracing();

    let store = UserStore::new();
    for name in ["ada", "grace", "linus", "barbara", "ken", "dennis", "margaret"] {
        store.insert(name);
    }

    // Port 0 picks a free port
    let server = RpcServer::new(RpcServerConfig::default())
        .with_filters(FilterSet::new().with(LoggingFilter::default()));
    server.register_service(user_service_key(), user_service(store));
    let port = server.start(0).await?;

    let client = Arc::new(RpcClient::websocket(RpcClientConfig::default()));
    client.start();

    let discovery = StaticDiscovery::new()
        .with_instance(user_service_key(), Instance::new(format!("127.0.0.1:{port}")));
    let users = ServiceReference::new(
        user_service_key(),
        client.clone(),
        Arc::new(discovery),
        BitcodeCodec,
    )
    .with_strategy("least_active")?;

    // `join!` will await all responses before proceeding
    let (user, created, missing) = join!(
        users.call::<_, User>("get_user_by_id", (7u64,)),
        users.call::<_, User>("create_user", ("edsger".to_string(),)),
        users.call::<_, User>("get_user_by_id", (404u64,)),
    );
    tracing::info!("Result from get_user_by_id(7): {:?}", user);
    tracing::info!("Result from create_user(\"edsger\"): {:?}", created);
    tracing::info!("Result from get_user_by_id(404): {:?}", missing);

    let count: u64 = users.call("count_users", ()).await?;
    tracing::info!(count, "Result from count_users()");

    client.shutdown().await;
    server.shutdown().await;
    Ok(())
}
