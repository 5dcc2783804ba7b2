//! Value Codecs
//!
//! Remote stores keep values as bytes. A `Codec` turns any serde value into
//! bytes and back; in-process stores never touch it.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CodecError;

// == Codec Trait ==
/// Serializes values for remote storage.
pub trait Codec: Send + Sync + 'static {
    /// Encodes `value`, failing with `CodecError::Encode` when it cannot be represented.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decodes `bytes` into a fresh `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;

    /// Decodes `bytes` into an existing slot. The slot is untouched on failure.
    fn decode_into<T: DeserializeOwned>(&self, bytes: &[u8], slot: &mut T) -> Result<(), CodecError> {
        *slot = self.decode(bytes)?;
        Ok(())
    }
}

// == JSON Codec ==
/// `Codec` backed by serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::Decode("empty payload".to_string()));
        }
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
