//! Codec Module
//!
//! Serializes structured values and compresses large payloads. Encoding runs
//! on `set`, decoding on every read.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};

// == Cache Value ==
/// A value as seen by callers.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// Strings and byte buffers, stored as-is
    Raw(Vec<u8>),
    /// Composite values, flattened to JSON on store
    Structured(Value),
}

impl CacheValue {
    /// Converts any serializable value into a structured cache value.
    pub fn structured<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(CacheValue::Structured)
            .map_err(|e| CacheError::Encode(e.to_string()))
    }

    /// Reads the value back into a typed form.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        let parsed = match self {
            CacheValue::Raw(bytes) => serde_json::from_slice(bytes),
            CacheValue::Structured(value) => serde_json::from_value(value.clone()),
        };
        parsed.map_err(|e| CacheError::Decode(e.to_string()))
    }

    /// Maps a JSON payload onto a cache value: strings stay raw, everything
    /// else is structured.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(s) => CacheValue::Raw(s.into_bytes()),
            other => CacheValue::Structured(other),
        }
    }

    /// Renders the value as JSON. Non UTF-8 raw bytes become a number array.
    pub fn to_json(&self) -> Value {
        match self {
            CacheValue::Raw(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => Value::String(s.to_string()),
                Err(_) => Value::from(bytes.clone()),
            },
            CacheValue::Structured(value) => value.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheValue::Raw(bytes) => std::str::from_utf8(bytes).ok(),
            CacheValue::Structured(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            CacheValue::Structured(value) => Some(value),
            CacheValue::Raw(_) => None,
        }
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::Raw(value.as_bytes().to_vec())
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::Raw(value.into_bytes())
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(value: Vec<u8>) -> Self {
        CacheValue::Raw(value)
    }
}

impl From<&[u8]> for CacheValue {
    fn from(value: &[u8]) -> Self {
        CacheValue::Raw(value.to_vec())
    }
}

impl From<Value> for CacheValue {
    fn from(value: Value) -> Self {
        CacheValue::Structured(value)
    }
}

// == Encoded Value ==
/// A value as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EncodedValue {
    Raw(Vec<u8>),
    Serialized(Vec<u8>),
    Compressed(Vec<u8>),
    SerializedCompressed(Vec<u8>),
}

impl EncodedValue {
    /// Stored size in bytes.
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    pub fn is_compressed(&self) -> bool {
        matches!(
            self,
            EncodedValue::Compressed(_) | EncodedValue::SerializedCompressed(_)
        )
    }

    pub fn is_serialized(&self) -> bool {
        matches!(
            self,
            EncodedValue::Serialized(_) | EncodedValue::SerializedCompressed(_)
        )
    }

    fn bytes(&self) -> &[u8] {
        match self {
            EncodedValue::Raw(b)
            | EncodedValue::Serialized(b)
            | EncodedValue::Compressed(b)
            | EncodedValue::SerializedCompressed(b) => b,
        }
    }
}

// == Codec ==
/// Encode/decode pipeline parameterized by the compression threshold.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    compression_threshold: usize,
}

impl Codec {
    pub fn new(compression_threshold: usize) -> Self {
        Self {
            compression_threshold,
        }
    }

    /// Encodes a value for storage.
    ///
    /// `compress` overrides the size threshold: `Some(true)` always
    /// compresses, `Some(false)` never does.
    pub fn encode(&self, value: &CacheValue, compress: Option<bool>) -> Result<EncodedValue> {
        let (bytes, serialized) = match value {
            CacheValue::Raw(bytes) => (bytes.clone(), false),
            CacheValue::Structured(v) => (
                serde_json::to_vec(v).map_err(|e| CacheError::Encode(e.to_string()))?,
                true,
            ),
        };

        let should_compress =
            compress.unwrap_or(bytes.len() >= self.compression_threshold);
        if !should_compress {
            return Ok(if serialized {
                EncodedValue::Serialized(bytes)
            } else {
                EncodedValue::Raw(bytes)
            });
        }

        let compressed = compress_bytes(&bytes)?;
        Ok(if serialized {
            EncodedValue::SerializedCompressed(compressed)
        } else {
            EncodedValue::Compressed(compressed)
        })
    }

    /// Decodes a stored value: decompress first, then deserialize.
    pub fn decode(&self, encoded: &EncodedValue) -> Result<CacheValue> {
        match encoded {
            EncodedValue::Raw(bytes) => Ok(CacheValue::Raw(bytes.clone())),
            EncodedValue::Serialized(bytes) => deserialize_bytes(bytes),
            EncodedValue::Compressed(bytes) => decompress_bytes(bytes).map(CacheValue::Raw),
            EncodedValue::SerializedCompressed(bytes) => {
                deserialize_bytes(&decompress_bytes(bytes)?)
            }
        }
    }
}

fn compress_bytes(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| CacheError::Encode(format!("compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Encode(format!("compression failed: {}", e)))
}

fn decompress_bytes(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CacheError::Decode(format!("decompression failed: {}", e)))?;
    Ok(out)
}

fn deserialize_bytes(bytes: &[u8]) -> Result<CacheValue> {
    serde_json::from_slice(bytes)
        .map(CacheValue::Structured)
        .map_err(|e| CacheError::Decode(e.to_string()))
}
