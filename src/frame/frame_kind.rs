use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The role of a frame on the wire.
///
/// `Request` expects a matching `Response`; `OneWay` carries a request for
/// which no response is ever sent. `Ping`/`Pong` are connection keepalive
/// probes and never reach the RPC layer.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum FrameKind {
    Request = 0,
    Response = 1,
    OneWay = 2,
    Ping = 3,
    Pong = 4,
}
