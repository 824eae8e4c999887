use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameEncodeError {
    /// The payload exceeds `MAX_FRAME_PAYLOAD_SIZE`.
    #[error("frame payload of {0} bytes exceeds the maximum")]
    PayloadTooLarge(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameDecodeError {
    /// Fewer bytes than the fixed header, or fewer than the declared payload length.
    #[error("incomplete frame")]
    IncompleteHeader,

    /// The declared payload length exceeds `MAX_FRAME_PAYLOAD_SIZE`.
    #[error("declared payload of {0} bytes exceeds the maximum")]
    PayloadTooLarge(usize),

    /// The kind byte does not name a known `FrameKind`.
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),

    /// Trailing bytes after the declared payload.
    #[error("corrupt frame")]
    CorruptFrame,
}
