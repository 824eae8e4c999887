// Frame related constants
pub const FRAME_LENGTH_FIELD_SIZE: usize = 4;
pub const FRAME_KIND_OFFSET: usize = 4;
pub const FRAME_CORRELATION_ID_OFFSET: usize = 5;
pub const FRAME_TIMESTAMP_OFFSET: usize = 9;
pub const FRAME_HEADER_SIZE: usize = 17;

/// Upper bound on a single frame payload.
///
/// Frames larger than this are rejected on both the encode and decode side so a
/// corrupt length prefix can never trigger an unbounded allocation.
pub const MAX_FRAME_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Call timeout applied when a request does not carry its own.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 5_000;
