use bitcode::{Decode, Encode};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Wire-level outcome code of a response.
///
/// Every server-side failure is classified into one of these before it is
/// written back, so the caller can rebuild the matching `RpcError`.
#[repr(u8)]
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Encode, Decode,
)]
pub enum RpcResultStatus {
    Success = 0,
    /// The service implementation itself failed.
    Fail = 1,
    SystemError = 2,
    MethodNotFound = 3,
    ServiceNotFound = 4,
    ArgumentMismatch = 5,
    SerializationError = 6,
    FilterRejected = 7,
    Timeout = 8,
}
