use crate::frame::FrameKind;
use crate::utils::now;

/// Represents a single frame on a duplex channel.
///
/// A frame carries exactly one encoded request, response, or keepalive probe.
/// Transports must deliver whole frames: one frame in, one frame out.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// What the payload contains.
    pub kind: FrameKind,

    /// Links a `Response` (or `Pong`) to the `Request` (or `Ping`) it answers.
    pub correlation_id: u32,

    /// Local send time, in microseconds since the UNIX epoch.
    pub timestamp_micros: u64,

    /// The encoded envelope. Empty for keepalive probes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a frame stamped with the current time.
    pub fn new(kind: FrameKind, correlation_id: u32, payload: Vec<u8>) -> Self {
        Self {
            kind,
            correlation_id,
            timestamp_micros: now(),
            payload,
        }
    }

    pub fn ping(probe_id: u32) -> Self {
        Self::new(FrameKind::Ping, probe_id, Vec::new())
    }

    pub fn pong(probe_id: u32) -> Self {
        Self::new(FrameKind::Pong, probe_id, Vec::new())
    }
}
