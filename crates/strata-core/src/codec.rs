//! Key and value serializer traits plus the stock implementations.

use std::fmt::Display;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Codec failure for a cache key or value.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    #[error("failed to serialize key: {0}")]
    Key(String),

    #[error("failed to serialize value: {0}")]
    Encode(String),

    #[error("failed to deserialize value: {0}")]
    Decode(String),
}

/// Serializes a typed key to its canonical string form.
///
/// Serialization must be deterministic and injective within a namespace:
/// two distinct keys never map to the same string.
pub trait KeySerializer<K>: Send + Sync {
    fn serialize(&self, key: &K) -> Result<String, CodecError>;
}

/// Serializes values to bytes and back.
///
/// Implementations must round-trip exactly: `deserialize(serialize(v))`
/// yields a value equal to `v`.
pub trait ValueSerializer<V>: Send + Sync {
    fn serialize(&self, value: &V) -> Result<Vec<u8>, CodecError>;

    fn deserialize(&self, bytes: &[u8]) -> Result<V, CodecError>;
}

/// Key codec that uses the key's `Display` form.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisplayKeySerializer;

impl<K: Display> KeySerializer<K> for DisplayKeySerializer {
    fn serialize(&self, key: &K) -> Result<String, CodecError> {
        Ok(key.to_string())
    }
}

/// JSON value codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl<V> ValueSerializer<V> for JsonSerializer
where
    V: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &V) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<V, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// MessagePack value codec, for compact storage of larger values.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessagePackSerializer;

impl<V> ValueSerializer<V> for MessagePackSerializer
where
    V: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &V) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<V, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Identity codec for plain string values.
///
/// An empty string stores as an empty payload, which the cache reads back
/// as a negative entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringSerializer;

impl ValueSerializer<String> for StringSerializer {
    fn serialize(&self, value: &String) -> Result<Vec<u8>, CodecError> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String, CodecError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
