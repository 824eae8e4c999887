use skein::rpc::RpcError;
use tokio::net::TcpListener;

/// Binds `host:port`; port `0` lets the OS pick a free one.
pub async fn bind_listener(host: &str, port: u16) -> Result<TcpListener, RpcError> {
    TcpListener::bind((host, port))
        .await
        .map_err(|err| RpcError::Network(format!("bind {host}:{port}: {err}")))
}

/// The port a listener actually got, which differs from the requested one
/// when it was bound to port `0`.
pub fn bound_port(listener: &TcpListener) -> Result<u16, RpcError> {
    Ok(listener.local_addr()?.port())
}
