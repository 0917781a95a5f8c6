//! Serialization codecs for persisted values.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::CodecError;

/// Turns values into bytes and back.
///
/// A codec must round-trip values exactly: decoding what it encoded yields a
/// value equal to the original.
pub trait Codec: Send + Sync {
    /// File extension (without the dot) used for stored values.
    fn extension(&self) -> &str;

    /// Encodes a value.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decodes a value.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;

    /// Returns true if the bytes hold no meaningful value.
    fn is_blank(&self, bytes: &[u8]) -> bool {
        bytes.iter().all(u8::is_ascii_whitespace)
    }
}

/// JSON codec, pretty-printed by default so stored files are easy to inspect.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec {
    pretty: bool,
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl JsonCodec {
    /// Creates a pretty-printing JSON codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a codec that writes compact JSON.
    #[must_use]
    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl Codec for JsonCodec {
    fn extension(&self) -> &str {
        "json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(bytes)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    // `null` is what an unset optional serializes to.
    fn is_blank(&self, bytes: &[u8]) -> bool {
        let text = String::from_utf8_lossy(bytes);
        let trimmed = text.trim();
        trimmed.is_empty() || trimmed == "null"
    }
}
