use crate::{
    constants::{
        FRAME_CORRELATION_ID_OFFSET, FRAME_HEADER_SIZE, FRAME_KIND_OFFSET,
        FRAME_LENGTH_FIELD_SIZE, FRAME_TIMESTAMP_OFFSET, MAX_FRAME_PAYLOAD_SIZE,
    },
    frame::{Frame, FrameDecodeError, FrameEncodeError, FrameKind},
};

/// Provides encoding and decoding functionality for frames.
///
/// Layout (little-endian):
///
/// ```text
/// | payload len: u32 | kind: u8 | correlation id: u32 | timestamp: u64 | payload |
/// ```
///
/// The codec never inspects the payload; the RPC layer owns its contents.
pub struct FrameCodec;

impl FrameCodec {
    /// Encodes a `Frame` into a byte vector ready to hand to a duplex channel.
    pub fn encode(frame: &Frame) -> Result<Vec<u8>, FrameEncodeError> {
        if frame.payload.len() > MAX_FRAME_PAYLOAD_SIZE {
            return Err(FrameEncodeError::PayloadTooLarge(frame.payload.len()));
        }

        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + frame.payload.len());

        buf.extend(&(frame.payload.len() as u32).to_le_bytes());
        buf.push(frame.kind.into());
        buf.extend(&frame.correlation_id.to_le_bytes());
        buf.extend(&frame.timestamp_micros.to_le_bytes());
        buf.extend(&frame.payload);

        Ok(buf)
    }

    /// Decodes exactly one frame from `buf`.
    ///
    /// The buffer must hold one complete frame and nothing else; partial
    /// frames and trailing bytes are both rejected.
    pub fn decode(buf: &[u8]) -> Result<Frame, FrameDecodeError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(FrameDecodeError::IncompleteHeader);
        }

        let len = read_u32(buf, 0)? as usize;

        if len > MAX_FRAME_PAYLOAD_SIZE {
            return Err(FrameDecodeError::PayloadTooLarge(len));
        }

        let total = FRAME_HEADER_SIZE + len;
        if buf.len() < total {
            return Err(FrameDecodeError::IncompleteHeader);
        }
        if buf.len() > total {
            return Err(FrameDecodeError::CorruptFrame);
        }

        let kind_byte = buf[FRAME_KIND_OFFSET];
        let kind =
            FrameKind::try_from(kind_byte).map_err(|_| FrameDecodeError::UnknownKind(kind_byte))?;

        let correlation_id = read_u32(buf, FRAME_CORRELATION_ID_OFFSET)?;

        let timestamp_micros = buf
            .get(FRAME_TIMESTAMP_OFFSET..FRAME_HEADER_SIZE)
            .and_then(|bytes| bytes.try_into().ok())
            .map(u64::from_le_bytes)
            .ok_or(FrameDecodeError::IncompleteHeader)?;

        Ok(Frame {
            kind,
            correlation_id,
            timestamp_micros,
            payload: buf[FRAME_HEADER_SIZE..total].to_vec(),
        })
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, FrameDecodeError> {
    buf.get(offset..offset + FRAME_LENGTH_FIELD_SIZE)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(FrameDecodeError::IncompleteHeader)
}
