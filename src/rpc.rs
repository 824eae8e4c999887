mod rpc_call_metadata;
mod rpc_envelope;
mod rpc_error;
mod rpc_request_response;
mod rpc_result_status;
mod rpc_service_key;

pub use rpc_call_metadata::CallMetadata;
pub use rpc_envelope::RpcMessage;
pub use rpc_error::{CodecError, RpcError};
pub use rpc_request_response::{RpcRequest, RpcResponse};
pub use rpc_result_status::RpcResultStatus;
pub use rpc_service_key::ServiceKey;
