use crate::Connection;
use skein::rpc::RpcMessage;
use skein_rpc_service_caller::ConnectionState;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;

/// Runs one heartbeat task per connection.
///
/// Probes are fixed-delay: the next probe is scheduled `interval` after the
/// previous round finished, so a slow round never stacks up with the next.
/// Each round first settles the previous probe with the connection's
/// liveness tracker; a `Dead` verdict closes the connection, which fails
/// every call still bound to it.
///
/// The tasks belong to this manager and stop on [`shutdown`](Self::shutdown).
#[derive(Default)]
pub struct HeartbeatManager {
    tasks: Mutex<JoinSet<()>>,
}

impl HeartbeatManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_heartbeat(&self, connection: Arc<Connection>, interval: Duration) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Reap tasks of connections that are already gone.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(Self::run(connection, interval));
    }

    /// Number of heartbeat tasks still tracked.
    pub fn len(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops every heartbeat task and waits for them to finish.
    pub async fn shutdown(&self) {
        let mut tasks = std::mem::take(
            &mut *self
                .tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        tasks.shutdown().await;
    }

    async fn run(connection: Arc<Connection>, interval: Duration) {
        loop {
            if !connection.is_open() {
                break;
            }

            match connection.liveness().probe_due() {
                ConnectionState::Dead => {
                    tracing::warn!(
                        address = connection.address(),
                        missed = connection.liveness().missed(),
                        "Heartbeat lost; connection is dead"
                    );
                    connection.close("heartbeat timed out");
                    break;
                }
                ConnectionState::Suspect => {
                    tracing::warn!(
                        address = connection.address(),
                        missed = connection.liveness().missed(),
                        "Heartbeat missed; connection is suspect"
                    );
                }
                _ => {}
            }

            let probe = RpcMessage::Ping(connection.next_probe_id());
            if let Err(err) = connection.send_message(&probe) {
                tracing::debug!(address = connection.address(), error = %err, "Heartbeat send failed");
                connection.close("heartbeat send failed");
                break;
            }

            tokio::time::sleep(interval).await;
        }
    }
}
