use crate::frame::{FrameDecodeError, FrameEncodeError};
use crate::rpc::RpcResultStatus;

/// Failure reported by a payload codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("serialize error: {0}")]
    Serialize(String),

    #[error("deserialize error: {0}")]
    Deserialize(String),
}

/// Every failure a call can end with, on either side of the wire.
///
/// Variants that can originate on the server carry their detail as a plain
/// string so they survive the trip through an error response unchanged:
/// `RpcError::from_status(err.status(), err.detail())` rebuilds the same
/// variant on the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// Connect, send, or close failed.
    #[error("network error: {0}")]
    Network(String),

    /// The call deadline passed before a response arrived.
    #[error("call timed out")]
    Timeout,

    /// The connection carrying the call went away while it was in flight.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("argument mismatch: {0}")]
    ArgumentMismatch(String),

    /// The service implementation failed; the message is the callee's own.
    #[error("invocation target error: {0}")]
    InvocationTarget(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("no available instance for {0}")]
    NoAvailableInstance(String),

    #[error("unknown load balance strategy: {0}")]
    UnknownStrategy(String),

    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    #[error("duplicate correlation id: {0}")]
    DuplicateCorrelationId(u32),

    /// A filter ended the call without reaching the target.
    #[error("rejected by filter: {0}")]
    FilterRejected(String),

    #[error("frame error: {0}")]
    Frame(#[from] FrameDecodeError),

    #[error("server already started")]
    AlreadyStarted,

    #[error("not running")]
    NotRunning,

    /// A server-side fault that did not fit any other classification.
    #[error("remote system error: {0}")]
    Remote(String),
}

impl RpcError {
    /// The wire status this error is reported with.
    pub fn status(&self) -> RpcResultStatus {
        match self {
            RpcError::InvocationTarget(_) => RpcResultStatus::Fail,
            RpcError::MethodNotFound(_) => RpcResultStatus::MethodNotFound,
            RpcError::ServiceNotFound(_) => RpcResultStatus::ServiceNotFound,
            RpcError::ArgumentMismatch(_) => RpcResultStatus::ArgumentMismatch,
            RpcError::Serialization(_) => RpcResultStatus::SerializationError,
            RpcError::FilterRejected(_) => RpcResultStatus::FilterRejected,
            RpcError::Timeout => RpcResultStatus::Timeout,
            _ => RpcResultStatus::SystemError,
        }
    }

    /// The variant's payload, without the display prefix.
    pub fn detail(&self) -> String {
        match self {
            RpcError::Network(s)
            | RpcError::ConnectionLost(s)
            | RpcError::Serialization(s)
            | RpcError::MethodNotFound(s)
            | RpcError::ArgumentMismatch(s)
            | RpcError::InvocationTarget(s)
            | RpcError::ServiceNotFound(s)
            | RpcError::NoAvailableInstance(s)
            | RpcError::UnknownStrategy(s)
            | RpcError::UnknownCodec(s)
            | RpcError::UnknownFilter(s)
            | RpcError::FilterRejected(s)
            | RpcError::Remote(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Rebuilds an error from a response's status and detail message.
    pub fn from_status(status: RpcResultStatus, detail: String) -> RpcError {
        match status {
            RpcResultStatus::Fail => RpcError::InvocationTarget(detail),
            RpcResultStatus::MethodNotFound => RpcError::MethodNotFound(detail),
            RpcResultStatus::ServiceNotFound => RpcError::ServiceNotFound(detail),
            RpcResultStatus::ArgumentMismatch => RpcError::ArgumentMismatch(detail),
            RpcResultStatus::SerializationError => RpcError::Serialization(detail),
            RpcResultStatus::FilterRejected => RpcError::FilterRejected(detail),
            RpcResultStatus::Timeout => RpcError::Timeout,
            RpcResultStatus::SystemError | RpcResultStatus::Success => RpcError::Remote(detail),
        }
    }

    /// Whether the failure happened below the RPC layer (transport or deadline).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcError::Network(_) | RpcError::Timeout | RpcError::ConnectionLost(_)
        )
    }
}

impl From<CodecError> for RpcError {
    fn from(err: CodecError) -> Self {
        RpcError::Serialization(err.to_string())
    }
}

impl From<FrameEncodeError> for RpcError {
    fn from(err: FrameEncodeError) -> Self {
        RpcError::Network(err.to_string())
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Network(err.to_string())
    }
}
