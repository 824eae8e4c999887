use crate::DuplexChannel;
use skein::rpc::{RpcError, RpcMessage, RpcRequest, RpcResponse};
use skein::utils::IncrementU32Id;
use skein_rpc_service_caller::{
    ConnectionId, ConnectionState, LivenessTracker, PendingCallHandle, PendingCallTable,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// A client-side connection to one address.
///
/// Owns the outbound half of its duplex channel and a task reading the
/// inbound half. Responses are routed into the shared pending-call table;
/// heartbeat acks feed the liveness tracker. Once closed (by the peer, by a
/// heartbeat verdict, or by the client) the connection is `Dead` and every
/// call still bound to it fails with `ConnectionLost`.
pub struct Connection {
    id: ConnectionId,
    address: String,
    outbound: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    liveness: LivenessTracker,
    probe_ids: IncrementU32Id,
    pending: Arc<PendingCallTable>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Wraps an established channel and starts reading from it.
    pub fn open(
        id: ConnectionId,
        address: &str,
        channel: DuplexChannel,
        pending: Arc<PendingCallTable>,
        miss_threshold: u32,
    ) -> Arc<Connection> {
        let connection = Arc::new(Connection {
            id,
            address: address.to_string(),
            outbound: Mutex::new(Some(channel.outbound)),
            liveness: LivenessTracker::new(miss_threshold),
            probe_ids: IncrementU32Id::new(),
            pending,
            receive_task: Mutex::new(None),
        });
        connection.liveness.mark_active();

        let task = tokio::spawn(Self::receive_loop(connection.clone(), channel.inbound));
        *lock(&connection.receive_task) = Some(task);

        connection
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn liveness(&self) -> &LivenessTracker {
        &self.liveness
    }

    pub fn state(&self) -> ConnectionState {
        self.liveness.state()
    }

    pub fn is_open(&self) -> bool {
        self.state() != ConnectionState::Dead && lock(&self.outbound).is_some()
    }

    pub fn next_probe_id(&self) -> u32 {
        self.probe_ids.next_id()
    }

    /// Encodes and queues one frame.
    pub fn send_message(&self, message: &RpcMessage) -> Result<(), RpcError> {
        let bytes = message.encode()?;
        let outbound = lock(&self.outbound);
        let Some(tx) = outbound.as_ref() else {
            return Err(RpcError::ConnectionLost(format!("{} is closed", self.address)));
        };
        tx.send(bytes)
            .map_err(|_| RpcError::ConnectionLost(format!("{} is closed", self.address)))
    }

    /// Sends a request whose correlation ID is already assigned.
    ///
    /// Two-way calls are registered in the pending table before the frame is
    /// queued. One-way calls are never registered and get a handle that is
    /// already resolved with an empty success response.
    pub fn send_request(
        &self,
        request: RpcRequest,
        deadline: Instant,
    ) -> Result<PendingCallHandle, RpcError> {
        if self.state() == ConnectionState::Dead {
            return Err(RpcError::ConnectionLost(format!("{} is dead", self.address)));
        }

        let correlation_id = request.correlation_id;
        if request.is_one_way() {
            self.send_message(&RpcMessage::OneWay(request))?;
            return Ok(PendingCallHandle::ready(
                correlation_id,
                Ok(RpcResponse::success(correlation_id, Vec::new())),
            ));
        }

        let handle = self.pending.register(correlation_id, deadline, self.id)?;
        if let Err(err) = self.send_message(&RpcMessage::Request(request)) {
            self.pending.resolve_failure(correlation_id, err.clone());
            return Err(err);
        }
        Ok(handle)
    }

    /// Tears the connection down and fails its pending calls.
    pub fn close(&self, reason: &str) {
        self.shut(reason);
        if let Some(task) = lock(&self.receive_task).take() {
            task.abort();
        }
    }

    fn shut(&self, reason: &str) {
        let was_open = lock(&self.outbound).take().is_some();
        self.liveness.mark_dead();
        self.pending.fail_connection(
            self.id,
            RpcError::ConnectionLost(format!("{}: {}", self.address, reason)),
        );
        if was_open {
            tracing::info!(address = %self.address, connection_id = self.id, reason, "Connection closed");
        }
    }

    async fn receive_loop(connection: Arc<Connection>, mut inbound: UnboundedReceiver<Vec<u8>>) {
        while let Some(bytes) = inbound.recv().await {
            match RpcMessage::decode(&bytes) {
                Ok(RpcMessage::Response(response)) => {
                    let correlation_id = response.correlation_id;
                    if !connection.pending.resolve_success(correlation_id, response) {
                        tracing::warn!(
                            address = %connection.address,
                            correlation_id,
                            "Dropping unmatched response"
                        );
                    }
                }
                Ok(RpcMessage::Pong(_)) => {
                    connection.liveness.ack();
                }
                Ok(RpcMessage::Ping(probe_id)) => {
                    let _ = connection.send_message(&RpcMessage::Pong(probe_id));
                }
                Ok(RpcMessage::Request(_) | RpcMessage::OneWay(_)) => {
                    tracing::warn!(address = %connection.address, "Client received a request frame; dropping it");
                }
                Err(err) => {
                    tracing::warn!(address = %connection.address, error = %err, "Dropping undecodable frame");
                }
            }
        }

        connection.shut("closed by peer");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
