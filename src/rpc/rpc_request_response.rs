use crate::rpc::{CallMetadata, RpcError, RpcResultStatus, ServiceKey};
use bitcode::{Decode, Encode};

/// An outbound call.
///
/// Parameter values are opaque bytes produced by the caller's codec; the core
/// never looks inside them. `correlation_id` is assigned by the client when the
/// request is sent and is `0` until then.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RpcRequest {
    pub correlation_id: u32,
    pub service_name: String,
    pub service_version: String,
    pub method_name: String,
    pub param_types: Vec<String>,
    pub param_values: Vec<Vec<u8>>,
    pub metadata: CallMetadata,
}

impl RpcRequest {
    pub fn new(service: &ServiceKey, method_name: impl Into<String>) -> Self {
        Self {
            correlation_id: 0,
            service_name: service.name.clone(),
            service_version: service.version.clone(),
            method_name: method_name.into(),
            param_types: Vec::new(),
            param_values: Vec::new(),
            metadata: CallMetadata::default(),
        }
    }

    pub fn with_params(mut self, param_types: Vec<String>, param_values: Vec<Vec<u8>>) -> Self {
        self.param_types = param_types;
        self.param_values = param_values;
        self
    }

    pub fn with_metadata(mut self, metadata: CallMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: u32) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn service_key(&self) -> ServiceKey {
        ServiceKey::new(&self.service_name, &self.service_version)
    }

    pub fn is_one_way(&self) -> bool {
        self.metadata.one_way
    }

    /// `method(type, type, ...)`, used in logs and dispatch errors.
    pub fn signature(&self) -> String {
        format!("{}({})", self.method_name, self.param_types.join(", "))
    }
}

/// The answer to exactly one `RpcRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RpcResponse {
    /// Equal to the originating request's correlation ID.
    pub correlation_id: u32,
    pub status: RpcResultStatus,
    /// Codec-encoded result value, present on success.
    pub payload: Option<Vec<u8>>,
    /// Error detail, present on failure.
    pub error_message: Option<String>,
}

impl RpcResponse {
    pub fn success(correlation_id: u32, payload: Vec<u8>) -> Self {
        Self {
            correlation_id,
            status: RpcResultStatus::Success,
            payload: Some(payload),
            error_message: None,
        }
    }

    /// Classifies `error` into a well-formed error response.
    pub fn failure(correlation_id: u32, error: &RpcError) -> Self {
        Self {
            correlation_id,
            status: error.status(),
            payload: None,
            error_message: Some(error.detail()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RpcResultStatus::Success
    }

    pub fn error_code(&self) -> u8 {
        self.status.into()
    }

    /// Turns the response into the result payload or the classified error.
    pub fn into_result(self) -> Result<Vec<u8>, RpcError> {
        match self.status {
            RpcResultStatus::Success => Ok(self.payload.unwrap_or_default()),
            status => Err(RpcError::from_status(
                status,
                self.error_message.unwrap_or_default(),
            )),
        }
    }
}
