use crate::RpcServerConfig;
use crate::in_flight::InFlight;
use crate::utils::{bind_listener, bound_port};
use axum::{
    Router,
    extract::ConnectInfo,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use skein::rpc::{RpcError, RpcMessage, RpcRequest, RpcResponse, ServiceKey};
use skein_rpc_service::FilterSet;
use skein_rpc_service::constants::DEFAULT_WS_PATH;
use skein_rpc_service_endpoint::{InvokerRegistry, ServiceDispatcher, ServiceInvoker};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

/// Lifecycle of an [`RpcServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Everything a connection task needs.
struct ConnectionContext {
    dispatcher: ServiceDispatcher,
    filters: FilterSet,
    idle_timeout: Duration,
    state: Arc<watch::Sender<ServerState>>,
    in_flight: Arc<InFlight>,
}

struct RunningServer {
    stop_accepting: oneshot::Sender<()>,
    serve_task: JoinHandle<()>,
}

/// A WebSocket RPC server.
///
/// Requests on one connection are handled concurrently, each in its own task,
/// and responses go out as they complete. Every request runs through the
/// server's filter set and then the service dispatcher.
///
/// `start` only succeeds from `Stopped`; any other state yields
/// `AlreadyStarted`. `shutdown` stops accepting connections, gives in-flight
/// requests `shutdown_grace` to finish, then closes every connection.
pub struct RpcServer {
    config: RpcServerConfig,
    registry: Arc<InvokerRegistry>,
    filters: FilterSet,
    state: Arc<watch::Sender<ServerState>>,
    in_flight: Arc<InFlight>,
    port: AtomicU16,
    running: Mutex<Option<RunningServer>>,
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new(RpcServerConfig::default())
    }
}

impl RpcServer {
    pub fn new(config: RpcServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(InvokerRegistry::new()),
            filters: FilterSet::new(),
            state: Arc::new(watch::Sender::new(ServerState::Stopped)),
            in_flight: Arc::new(InFlight::default()),
            port: AtomicU16::new(0),
            running: Mutex::new(None),
        }
    }

    /// Filters applied to every inbound request; takes effect on next start.
    #[must_use]
    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Serves from an existing registry, shared with other servers or
    /// populated elsewhere.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<InvokerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Returns the invoker registry, so services can be registered (or
    /// replaced) whether or not the server is running.
    pub fn registry(&self) -> Arc<InvokerRegistry> {
        self.registry.clone()
    }

    pub fn register_service(&self, key: ServiceKey, invoker: ServiceInvoker) {
        self.registry.register_invoker(key, invoker);
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// The bound port while running, `0` otherwise.
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    /// Binds `config.host:port` and starts serving. Port `0` picks a free
    /// port; the one chosen is returned and reported by [`port`](Self::port).
    pub async fn start(&self, port: u16) -> Result<u16, RpcError> {
        self.begin_start()?;
        match bind_listener(&self.config.host, port).await {
            Ok(listener) => self.serve_listener(listener),
            Err(err) => {
                self.state.send_replace(ServerState::Stopped);
                Err(err)
            }
        }
    }

    /// Starts serving on an already bound listener.
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<u16, RpcError> {
        self.begin_start()?;
        self.serve_listener(listener)
    }

    fn begin_start(&self) -> Result<(), RpcError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == ServerState::Stopped {
                *state = ServerState::Starting;
                true
            } else {
                false
            }
        });
        if claimed {
            Ok(())
        } else {
            Err(RpcError::AlreadyStarted)
        }
    }

    fn serve_listener(&self, listener: TcpListener) -> Result<u16, RpcError> {
        let port = match bound_port(&listener) {
            Ok(port) => port,
            Err(err) => {
                self.state.send_replace(ServerState::Stopped);
                return Err(err);
            }
        };

        let context = Arc::new(ConnectionContext {
            dispatcher: ServiceDispatcher::new(self.registry.clone()),
            filters: self.filters.clone(),
            idle_timeout: self.config.idle_timeout,
            state: self.state.clone(),
            in_flight: self.in_flight.clone(),
        });

        let app = Router::new().route(
            DEFAULT_WS_PATH,
            get({
                let context = context.clone();
                move |ws, conn| Self::ws_handler(ws, conn, context)
            }),
        );

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let serve_task = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await;
            if let Err(err) = result {
                tracing::error!("Server stopped with error: {}", err);
            }
        });

        *lock(&self.running) = Some(RunningServer {
            stop_accepting: stop_tx,
            serve_task,
        });
        self.port.store(port, Ordering::Release);
        self.state.send_replace(ServerState::Running);

        tracing::info!("Server running on {}:{}", self.config.host, port);
        Ok(port)
    }

    /// Stops the server. A no-op unless it is running.
    pub async fn shutdown(&self) {
        let stopping = self.state.send_if_modified(|state| {
            if *state == ServerState::Running {
                *state = ServerState::Stopping;
                true
            } else {
                false
            }
        });
        if !stopping {
            return;
        }

        let running = lock(&self.running).take();
        let Some(running) = running else {
            self.state.send_replace(ServerState::Stopped);
            return;
        };

        tracing::info!("Server shutting down");
        let _ = running.stop_accepting.send(());

        let grace = self.config.shutdown_grace;
        if tokio::time::timeout(grace, self.in_flight.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.in_flight.count(),
                "Shutdown grace period elapsed; aborting in-flight requests"
            );
        }

        // Connection tasks watch for this and close their sockets.
        self.state.send_replace(ServerState::Stopped);
        running.serve_task.abort();
        let _ = running.serve_task.await;
        self.port.store(0, Ordering::Release);

        tracing::info!("Server stopped");
    }

    async fn ws_handler(
        ws: WebSocketUpgrade,
        ConnectInfo(addr): ConnectInfo<SocketAddr>,
        context: Arc<ConnectionContext>,
    ) -> impl IntoResponse {
        tracing::info!("Client connected: {}", addr);
        ws.on_upgrade(move |socket| Self::handle_socket(context, socket, addr))
    }

    async fn handle_socket(context: Arc<ConnectionContext>, socket: WebSocket, addr: SocketAddr) {
        let (sender, receiver) = socket.split();
        let (tx, rx) = mpsc::unbounded_channel::<Message>();

        let send_task = tokio::spawn(Self::sender_task(sender, rx));
        Self::receiver_task(context, receiver, tx, addr).await;

        // The receiver task dropped its request tasks, and with them every
        // sender clone, so the send loop drains and exits.
        let _ = send_task.await;
        tracing::info!("Terminated connection for {}.", addr);
    }

    /// Forwards queued frames to the socket.
    async fn sender_task(
        mut sender: SplitSink<WebSocket, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    }

    /// Reads frames until the client leaves, goes idle, or the server stops.
    async fn receiver_task(
        context: Arc<ConnectionContext>,
        mut receiver: SplitStream<WebSocket>,
        tx: mpsc::UnboundedSender<Message>,
        addr: SocketAddr,
    ) {
        let mut requests = JoinSet::new();
        let mut state_rx = context.state.subscribe();

        let idle = tokio::time::sleep(context.idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() || *state_rx.borrow() == ServerState::Stopped {
                        tracing::info!("Closing connection to {} on shutdown.", addr);
                        break;
                    }
                }

                Some(_) = requests.join_next(), if !requests.is_empty() => {
                    if requests.is_empty() {
                        idle.as_mut().reset(Instant::now() + context.idle_timeout);
                    }
                }

                // A connection with requests in flight is never idle.
                _ = &mut idle, if requests.is_empty() => {
                    tracing::warn!("Client {} timed out. Closing connection.", addr);
                    break;
                }

                msg = receiver.next() => {
                    idle.as_mut().reset(Instant::now() + context.idle_timeout);
                    match msg {
                        Some(Ok(Message::Binary(bytes))) => {
                            Self::on_frame(&context, &bytes, &tx, &mut requests, addr);
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Client {} initiated close.", addr);
                            break;
                        }
                        // Text and WebSocket-level ping/pong carry no frames.
                        Some(Ok(_)) => {}
                        None | Some(Err(_)) => {
                            tracing::info!("Client {} disconnected.", addr);
                            break;
                        }
                    }
                }
            }
        }

        // Requests still running at this point are aborted.
        requests.shutdown().await;
    }

    fn on_frame(
        context: &Arc<ConnectionContext>,
        bytes: &[u8],
        tx: &mpsc::UnboundedSender<Message>,
        requests: &mut JoinSet<()>,
        addr: SocketAddr,
    ) {
        let (request, one_way) = match RpcMessage::decode(bytes) {
            Ok(RpcMessage::Request(request)) => (request, false),
            Ok(RpcMessage::OneWay(request)) => (request, true),
            Ok(RpcMessage::Ping(probe_id)) => {
                Self::send(tx, &RpcMessage::Pong(probe_id));
                return;
            }
            Ok(RpcMessage::Pong(_)) => {
                tracing::trace!("Received pong from {}", addr);
                return;
            }
            Ok(RpcMessage::Response(response)) => {
                tracing::warn!(
                    correlation_id = response.correlation_id,
                    "Server received a response frame from {}; dropping it",
                    addr
                );
                return;
            }
            Err(err) => {
                tracing::warn!("Dropping undecodable frame from {}: {}", addr, err);
                return;
            }
        };

        if *context.state.borrow() != ServerState::Running {
            if !one_way {
                Self::respond(tx, RpcResponse::failure(request.correlation_id, &RpcError::NotRunning));
            }
            return;
        }

        let guard = context.in_flight.begin();
        let context = context.clone();
        let tx = tx.clone();
        requests.spawn(async move {
            let _guard = guard;
            let response = Self::dispatch(&context, request).await;
            if !one_way {
                Self::respond(&tx, response);
            }
        });
    }

    async fn dispatch(context: &ConnectionContext, request: RpcRequest) -> RpcResponse {
        tracing::trace!(
            correlation_id = request.correlation_id,
            signature = %request.signature(),
            "Dispatching request"
        );
        context.dispatcher.handle(&context.filters, request).await
    }

    fn respond(tx: &mpsc::UnboundedSender<Message>, response: RpcResponse) {
        let correlation_id = response.correlation_id;
        if let Err(err) = Self::try_send(tx, &RpcMessage::Response(response)) {
            tracing::error!(correlation_id, error = %err, "Failed to encode response");
            // Still answer so the caller does not wait out its deadline.
            let fallback = RpcResponse::failure(correlation_id, &RpcError::Serialization(err.to_string()));
            Self::send(tx, &RpcMessage::Response(fallback));
        }
    }

    fn send(tx: &mpsc::UnboundedSender<Message>, message: &RpcMessage) {
        if let Err(err) = Self::try_send(tx, message) {
            tracing::error!(error = %err, "Failed to encode frame");
        }
    }

    fn try_send(tx: &mpsc::UnboundedSender<Message>, message: &RpcMessage) -> Result<(), RpcError> {
        let bytes = message.encode()?;
        // A closed channel means the client is already gone.
        let _ = tx.send(Message::Binary(Bytes::from(bytes)));
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
