use crate::constants::DEFAULT_CODEC_NAME;
use serde::{Serialize, de::DeserializeOwned};
use skein::rpc::{CodecError, RpcError};

/// Turns payload values into bytes and back.
///
/// The core calls a codec once per parameter value and once per result value;
/// it never assumes a byte format. Implementations are interchangeable as
/// long as both ends of a call agree on one.
pub trait Codec: Send + Sync + Clone + 'static {
    /// The code this codec is selected by.
    fn name(&self) -> &'static str;

    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized;

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned;
}

/// Compact native binary encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitcodeCodec;

impl Codec for BitcodeCodec {
    fn name(&self) -> &'static str {
        "bitcode"
    }

    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        bitcode::serialize(value).map_err(|e| CodecError::Serialize(e.to_string()))
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        bitcode::deserialize(bytes).map_err(|e| CodecError::Deserialize(e.to_string()))
    }
}

/// Human-readable JSON encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_vec(value).map_err(|e| CodecError::Serialize(e.to_string()))
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Deserialize(e.to_string()))
    }
}

/// A codec chosen at runtime by its string code.
///
/// Configuration names a codec once at startup; `CodecKind::from_name`
/// resolves it and the result is passed to services and references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    #[default]
    Bitcode,
    Json,
}

impl CodecKind {
    pub const ALL: [CodecKind; 2] = [CodecKind::Bitcode, CodecKind::Json];

    pub fn from_name(name: &str) -> Result<Self, RpcError> {
        CodecKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| RpcError::UnknownCodec(name.to_string()))
    }
}

impl Codec for CodecKind {
    fn name(&self) -> &'static str {
        match self {
            CodecKind::Bitcode => BitcodeCodec.name(),
            CodecKind::Json => JsonCodec.name(),
        }
    }

    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        match self {
            CodecKind::Bitcode => BitcodeCodec.serialize(value),
            CodecKind::Json => JsonCodec.serialize(value),
        }
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        match self {
            CodecKind::Bitcode => BitcodeCodec.deserialize(bytes),
            CodecKind::Json => JsonCodec.deserialize(bytes),
        }
    }
}
