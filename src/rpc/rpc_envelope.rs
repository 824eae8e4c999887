use crate::frame::{Frame, FrameCodec, FrameDecodeError, FrameKind};
use crate::rpc::{RpcError, RpcRequest, RpcResponse};

/// A decoded frame, classified by what it carries.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    /// A call that expects a response.
    Request(RpcRequest),
    /// A fire-and-forget call.
    OneWay(RpcRequest),
    Response(RpcResponse),
    Ping(u32),
    Pong(u32),
}

impl RpcMessage {
    /// Encodes the message into one frame's worth of bytes.
    pub fn encode(&self) -> Result<Vec<u8>, RpcError> {
        let frame = match self {
            RpcMessage::Request(req) => {
                Frame::new(FrameKind::Request, req.correlation_id, bitcode::encode(req))
            }
            RpcMessage::OneWay(req) => {
                Frame::new(FrameKind::OneWay, req.correlation_id, bitcode::encode(req))
            }
            RpcMessage::Response(resp) => {
                Frame::new(FrameKind::Response, resp.correlation_id, bitcode::encode(resp))
            }
            RpcMessage::Ping(id) => Frame::ping(*id),
            RpcMessage::Pong(id) => Frame::pong(*id),
        };

        Ok(FrameCodec::encode(&frame)?)
    }

    /// Builds the frame for sending `request`, honoring its one-way flag.
    pub fn from_request(request: RpcRequest) -> Self {
        if request.is_one_way() {
            RpcMessage::OneWay(request)
        } else {
            RpcMessage::Request(request)
        }
    }

    /// Decodes exactly one frame.
    ///
    /// The correlation ID in the frame header must match the one inside the
    /// envelope; a mismatch is treated as corruption.
    pub fn decode(bytes: &[u8]) -> Result<Self, RpcError> {
        let frame = FrameCodec::decode(bytes)?;

        let message = match frame.kind {
            FrameKind::Request | FrameKind::OneWay => {
                let req: RpcRequest = bitcode::decode(&frame.payload)
                    .map_err(|_| FrameDecodeError::CorruptFrame)?;
                if req.correlation_id != frame.correlation_id {
                    return Err(FrameDecodeError::CorruptFrame.into());
                }
                if frame.kind == FrameKind::OneWay {
                    RpcMessage::OneWay(req)
                } else {
                    RpcMessage::Request(req)
                }
            }
            FrameKind::Response => {
                let resp: RpcResponse = bitcode::decode(&frame.payload)
                    .map_err(|_| FrameDecodeError::CorruptFrame)?;
                if resp.correlation_id != frame.correlation_id {
                    return Err(FrameDecodeError::CorruptFrame.into());
                }
                RpcMessage::Response(resp)
            }
            FrameKind::Ping => RpcMessage::Ping(frame.correlation_id),
            FrameKind::Pong => RpcMessage::Pong(frame.correlation_id),
        };

        Ok(message)
    }
}
