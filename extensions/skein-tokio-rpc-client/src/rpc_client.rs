use crate::{Connection, DuplexTransport, HeartbeatManager, RpcClientConfig, WsTransport};
use skein::rpc::{RpcError, RpcRequest, RpcResponse};
use skein::utils::IncrementU32Id;
use skein_rpc_service_caller::{ConnectionState, PendingCallHandle, PendingCallTable};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

type ConnectionSlot = Arc<OnceCell<Arc<Connection>>>;

/// Sends requests to addresses and waits for their responses.
///
/// Keeps at most one connection per address. The first caller for an address
/// opens it and concurrent callers wait on that same attempt. A connection
/// that died is dropped and reopened on next use; calls that were bound to it
/// have already failed with `ConnectionLost`.
///
/// Correlation IDs come from a counter owned by this client, so they are
/// unique across all of its connections.
pub struct RpcClient {
    transport: Arc<dyn DuplexTransport>,
    config: RpcClientConfig,
    pending: Arc<PendingCallTable>,
    correlation_ids: IncrementU32Id,
    connection_ids: AtomicU64,
    connections: Mutex<HashMap<String, ConnectionSlot>>,
    heartbeats: HeartbeatManager,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl RpcClient {
    pub fn new(transport: impl DuplexTransport, config: RpcClientConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            pending: Arc::new(PendingCallTable::new()),
            correlation_ids: IncrementU32Id::new(),
            connection_ids: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
            heartbeats: HeartbeatManager::new(),
            sweeper: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// A client speaking WebSockets.
    pub fn websocket(config: RpcClientConfig) -> Self {
        Self::new(WsTransport, config)
    }

    pub fn config(&self) -> &RpcClientConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts the timeout sweeper. Calling it again is a no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        let pending = self.pending.clone();
        let sweep_interval = self.config.sweep_interval;
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                pending.expire_overdue();
            }
        });
        *lock(&self.sweeper) = Some(sweeper);
        tracing::debug!("RPC client started");
    }

    /// Stops background work, closes every connection, and fails whatever is
    /// still pending with `ConnectionLost`.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(sweeper) = lock(&self.sweeper).take() {
            sweeper.abort();
        }
        self.heartbeats.shutdown().await;

        let slots: Vec<ConnectionSlot> = lock(&self.connections).drain().map(|(_, s)| s).collect();
        for slot in slots {
            if let Some(connection) = slot.get() {
                connection.close("client shut down");
            }
        }

        self.pending
            .fail_all(RpcError::ConnectionLost("client shut down".into()));
        tracing::debug!("RPC client stopped");
    }

    /// Whether a live connection to `address` exists right now.
    pub fn is_connected(&self, address: &str) -> bool {
        self.connection_state(address)
            .is_some_and(|state| state != ConnectionState::Dead)
    }

    pub fn connection_state(&self, address: &str) -> Option<ConnectionState> {
        lock(&self.connections)
            .get(address)
            .and_then(|slot| slot.get())
            .map(|connection| {
                if connection.is_open() {
                    connection.state()
                } else {
                    ConnectionState::Dead
                }
            })
    }

    /// Number of calls waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Sends `request` and returns the handle its response will arrive on.
    ///
    /// The request gets a fresh correlation ID. Its deadline starts now.
    pub async fn send_async(
        &self,
        address: &str,
        request: RpcRequest,
    ) -> Result<PendingCallHandle, RpcError> {
        if !self.is_running() {
            return Err(RpcError::NotRunning);
        }

        let connection = self.connection_for(address).await?;
        let request = request.with_correlation_id(self.correlation_ids.next_id());
        let deadline = Instant::now() + request.metadata.timeout();

        tracing::trace!(
            address,
            correlation_id = request.correlation_id,
            signature = %request.signature(),
            "Sending request"
        );
        connection.send_request(request, deadline)
    }

    /// Sends `request` and waits until it resolves or its deadline passes.
    pub async fn send_sync(
        &self,
        address: &str,
        request: RpcRequest,
    ) -> Result<RpcResponse, RpcError> {
        self.send_async(address, request).await?.await
    }

    async fn connection_for(&self, address: &str) -> Result<Arc<Connection>, RpcError> {
        let slot = {
            let mut connections = lock(&self.connections);
            let dead = connections
                .get(address)
                .and_then(|slot| slot.get())
                .is_some_and(|connection| !connection.is_open());
            if dead {
                tracing::info!(address, "Reconnecting after dead connection");
                connections.remove(address);
            }
            connections.entry(address.to_string()).or_default().clone()
        };

        match slot.get_or_try_init(|| self.open_connection(address)).await {
            Ok(connection) => Ok(connection.clone()),
            Err(err) => {
                let mut connections = lock(&self.connections);
                if connections
                    .get(address)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot))
                {
                    connections.remove(address);
                }
                Err(err)
            }
        }
    }

    async fn open_connection(&self, address: &str) -> Result<Arc<Connection>, RpcError> {
        let channel = self.transport.connect(address).await?;
        let id = self.connection_ids.fetch_add(1, Ordering::Relaxed);
        let heartbeat = &self.config.heartbeat;

        let connection = Connection::open(
            id,
            address,
            channel,
            self.pending.clone(),
            heartbeat.miss_threshold,
        );
        if heartbeat.enabled {
            self.heartbeats
                .start_heartbeat(connection.clone(), heartbeat.interval);
        }

        tracing::info!(address, connection_id = id, "Connected");
        Ok(connection)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
