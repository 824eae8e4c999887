use dashmap::{DashMap, mapref::entry::Entry};
use futures::channel::oneshot;
use skein::rpc::{RpcError, RpcResponse};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

/// Identifies the connection a pending call was sent on.
pub type ConnectionId = u64;

pub type CallOutcome = Result<RpcResponse, RpcError>;

struct PendingCall {
    created_at: Instant,
    deadline: Instant,
    connection_id: ConnectionId,
    tx: oneshot::Sender<CallOutcome>,
}

/// The asynchronous result of one registered call.
///
/// Resolves exactly once, with the response or with the error that ended the
/// call (timeout, connection loss, transport failure).
#[derive(Debug)]
pub struct PendingCallHandle {
    correlation_id: u32,
    rx: oneshot::Receiver<CallOutcome>,
}

impl PendingCallHandle {
    /// A handle that is already resolved and was never registered. Used for
    /// one-way calls, which have nothing to wait for.
    pub fn ready(correlation_id: u32, outcome: CallOutcome) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { correlation_id, rx }
    }

    pub fn correlation_id(&self) -> u32 {
        self.correlation_id
    }
}

impl Future for PendingCallHandle {
    type Output = CallOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The table dropped the sender without resolving: only happens
            // when the table itself is dropped.
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(RpcError::ConnectionLost(
                "pending call table dropped".into(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Outstanding calls keyed by correlation ID.
///
/// Every resolution path removes the entry before completing its handle, so
/// whichever of success, failure, timeout, or connection loss arrives first
/// wins and every later attempt finds nothing to resolve.
#[derive(Default)]
pub struct PendingCallTable {
    calls: DashMap<u32, PendingCall>,
}

impl PendingCallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a call and returns the handle its caller awaits.
    pub fn register(
        &self,
        correlation_id: u32,
        deadline: Instant,
        connection_id: ConnectionId,
    ) -> Result<PendingCallHandle, RpcError> {
        match self.calls.entry(correlation_id) {
            Entry::Occupied(_) => Err(RpcError::DuplicateCorrelationId(correlation_id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(PendingCall {
                    created_at: Instant::now(),
                    deadline,
                    connection_id,
                    tx,
                });
                Ok(PendingCallHandle { correlation_id, rx })
            }
        }
    }

    /// Completes a call with its response. Returns `false` if nothing was
    /// waiting (late or duplicate response).
    pub fn resolve_success(&self, correlation_id: u32, response: RpcResponse) -> bool {
        self.resolve(correlation_id, Ok(response))
    }

    pub fn resolve_failure(&self, correlation_id: u32, error: RpcError) -> bool {
        self.resolve(correlation_id, Err(error))
    }

    fn resolve(&self, correlation_id: u32, outcome: CallOutcome) -> bool {
        match self.calls.remove(&correlation_id) {
            Some((_, call)) => {
                tracing::trace!(
                    correlation_id,
                    elapsed_us = call.created_at.elapsed().as_micros() as u64,
                    "Resolving pending call"
                );
                // The caller may have stopped waiting; that is fine.
                let _ = call.tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Fails every call whose deadline has passed with `Timeout`.
    pub fn expire_overdue(&self) -> usize {
        self.expire_overdue_at(Instant::now())
    }

    pub fn expire_overdue_at(&self, now: Instant) -> usize {
        let overdue: Vec<u32> = self
            .calls
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| *entry.key())
            .collect();

        let mut expired = 0;
        for correlation_id in overdue {
            if let Some((_, call)) = self
                .calls
                .remove_if(&correlation_id, |_, call| call.deadline <= now)
            {
                tracing::warn!(correlation_id, "Call timed out");
                let _ = call.tx.send(Err(RpcError::Timeout));
                expired += 1;
            }
        }
        expired
    }

    /// Fails every call bound to `connection_id`.
    pub fn fail_connection(&self, connection_id: ConnectionId, error: RpcError) -> usize {
        let bound: Vec<u32> = self
            .calls
            .iter()
            .filter(|entry| entry.connection_id == connection_id)
            .map(|entry| *entry.key())
            .collect();

        let mut failed = 0;
        for correlation_id in bound {
            if let Some((_, call)) = self
                .calls
                .remove_if(&correlation_id, |_, call| call.connection_id == connection_id)
            {
                let _ = call.tx.send(Err(error.clone()));
                failed += 1;
            }
        }

        if failed > 0 {
            tracing::warn!(connection_id, failed, error = %error, "Failed calls bound to connection");
        }
        failed
    }

    /// Fails every outstanding call.
    pub fn fail_all(&self, error: RpcError) -> usize {
        let ids: Vec<u32> = self.calls.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter(|id| self.resolve(*id, Err(error.clone())))
            .count()
    }

    pub fn contains(&self, correlation_id: u32) -> bool {
        self.calls.contains_key(&correlation_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
