// ABOUTME: MessagePack encoder/decoder for Rust with an incremental stream decoder.
// ABOUTME: Provides a dynamic Value model, extension types, serde integration and a serde_json-like API.

//! # serde_msgpack
//!
//! A MessagePack encoder and decoder for Rust.
//!
//! Decoding never recurses: containers are built on an explicit frame stack,
//! so nesting depth on input is bounded by memory, not by the call stack. The
//! same parsing state machine backs the in-memory [`Decoder`] and the
//! incremental [`StreamDecoder`], which can pause at any byte boundary and
//! resume when more input arrives.
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_msgpack::{to_vec, from_slice};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Person {
//!     name: String,
//!     age: u32,
//! }
//!
//! let person = Person {
//!     name: "Alice".to_string(),
//!     age: 30,
//! };
//!
//! let bytes = to_vec(&person).unwrap();
//! let decoded: Person = from_slice(&bytes).unwrap();
//! assert_eq!(person, decoded);
//! ```
//!
//! ## Working with Dynamic Values
//!
//! ```rust
//! use serde_msgpack::{decode, encode, msgpack};
//!
//! let value = msgpack!({
//!     "name": "test",
//!     "values": [1, 2, 3],
//!     "active": true
//! });
//!
//! let bytes = encode(&value).unwrap();
//! let decoded = decode(&bytes).unwrap();
//! assert_eq!(decoded.get_key("name").and_then(|v| v.as_str()), Some("test"));
//! assert_eq!(decoded, value);
//! ```
//!
//! ## Streaming
//!
//! ```rust
//! use serde_msgpack::{StreamDecoder, Value};
//!
//! let mut stream = StreamDecoder::new();
//! stream.feed(&[0x92, 0x01]);
//! assert_eq!(stream.next_value().unwrap(), None);
//! stream.feed(&[0x02]);
//! assert_eq!(
//!     stream.next_value().unwrap(),
//!     Some(Value::Array(vec![Value::Int(1), Value::Int(2)]))
//! );
//! ```
//!
//! ## Resource Limits
//!
//! - Every declared string, binary, array, map and extension length is
//!   checked against [`DecoderConfig`] before anything is allocated
//!   (default: `u32::MAX`)
//! - Encoding nesting depth is capped by [`EncoderConfig::max_depth`] (default: 100)
//! - The map key `"__proto__"` is always rejected

pub mod buffer;
pub mod de;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod ext;
pub mod key_cache;
pub mod ser;
pub mod stream;
pub mod types;
pub mod value;

// Re-export commonly used items at the crate root
pub use buffer::OutputBuffer;
pub use de::{from_slice, from_slice_with_config, from_value};
pub use decoder::{DecodeMulti, Decoder, DecoderConfig, KeyCaching};
pub use encoder::{to_vec, to_vec_with_config, Encoder, EncoderConfig};
pub use error::{Error, ErrorKind, LengthKind, Result};
pub use ext::{Extension, ExtensionCodec, Timestamp, TIMESTAMP_TYPE};
pub use key_cache::{KeyCache, SharedKeyCache};
pub use ser::Serializer;
pub use stream::{ArrayItems, StreamDecoder, StreamValues};
pub use types::limits;
pub use value::{Custom, Map, MapKey, Value};

// The msgpack! macro is automatically exported at crate root via #[macro_export]

use serde::{Deserialize, Serialize};
use std::io::Read;

/// Encode a `Value` to MessagePack bytes.
///
/// # Example
///
/// ```rust
/// use serde_msgpack::{encode, Value};
///
/// let bytes = encode(&Value::Int(42)).unwrap();
/// assert_eq!(bytes, vec![0x2a]); // positive fixint
/// ```
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    Encoder::new().encode(value)
}

/// Encode a `Value` with custom configuration.
pub fn encode_with_config(value: &Value, config: EncoderConfig) -> Result<Vec<u8>> {
    Encoder::with_config(config).encode(value)
}

/// Decode exactly one MessagePack value from `data`.
///
/// # Example
///
/// ```rust
/// use serde_msgpack::{decode, Value};
///
/// let value = decode(&[0x93, 0x01, 0x02, 0x03]).unwrap();
/// assert_eq!(value.as_array().map(|a| a.len()), Some(3));
/// ```
///
/// # Errors
///
/// Fails with [`Error::InsufficientData`] if `data` ends mid-value and with
/// [`Error::TrailingBytes`] if anything follows the value.
pub fn decode(data: &[u8]) -> Result<Value> {
    decode_with_config(data, DecoderConfig::default())
}

/// Decode exactly one MessagePack value with custom configuration.
pub fn decode_with_config(data: &[u8], config: DecoderConfig) -> Result<Value> {
    let mut decoder = Decoder::with_config(data, config);
    let value = decoder.decode_value()?;
    decoder.finish()?;
    Ok(value)
}

/// Lazily decode successive top-level values from `data`.
///
/// ```rust
/// use serde_msgpack::{decode_multi, Value};
///
/// let values: Vec<Value> = decode_multi(&[0x01, 0xc3, 0xa1, b'x'])
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(values, vec![Value::Int(1), Value::Bool(true), Value::from("x")]);
/// ```
pub fn decode_multi(data: &[u8]) -> DecodeMulti<'_> {
    Decoder::new(data).into_values()
}

/// Lazily decode successive top-level values with custom configuration.
pub fn decode_multi_with_config(data: &[u8], config: DecoderConfig) -> DecodeMulti<'_> {
    Decoder::with_config(data, config).into_values()
}

/// Decode exactly one value from a blocking reader, pulling as many chunks as needed.
pub fn decode_stream<R: Read>(reader: R) -> Result<Value> {
    StreamDecoder::new().decode_from(reader)
}

/// Decode exactly one value from a blocking reader with custom configuration.
pub fn decode_stream_with_config<R: Read>(reader: R, config: DecoderConfig) -> Result<Value> {
    StreamDecoder::with_config(config).decode_from(reader)
}

/// Lazily decode successive top-level values from a blocking reader.
pub fn decode_multi_stream<R: Read>(reader: R) -> StreamValues<R> {
    StreamDecoder::new().values(reader)
}

/// Lazily decode the elements of a single top-level array from a blocking reader.
pub fn decode_array_stream<R: Read>(reader: R) -> ArrayItems<R> {
    StreamDecoder::new().array_items(reader)
}

/// Decode exactly one value from an async reader.
#[cfg(feature = "async")]
pub async fn decode_async<R>(reader: R) -> Result<Value>
where
    R: futures::io::AsyncRead + Unpin,
{
    StreamDecoder::new().decode_async(reader).await
}

/// Decode exactly one value from an async reader with custom configuration.
#[cfg(feature = "async")]
pub async fn decode_async_with_config<R>(reader: R, config: DecoderConfig) -> Result<Value>
where
    R: futures::io::AsyncRead + Unpin,
{
    StreamDecoder::with_config(config).decode_async(reader).await
}

// Extensions serialize as (type_code, payload) and timestamps as (seconds, nanoseconds).
// Use `encode` to write them as real MessagePack extensions.
impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::{Error as _, SerializeMap, SerializeSeq, SerializeTuple};

        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::UInt(n) => serializer.serialize_u64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Binary(b) => serializer.serialize_bytes(b),
            Value::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for item in arr {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (key, val) in map {
                    m.serialize_entry(key, val)?;
                }
                m.end()
            }
            Value::Ext(ext) => {
                let mut tuple = serializer.serialize_tuple(2)?;
                tuple.serialize_element(&ext.type_code)?;
                tuple.serialize_element(&Bytes(&ext.data))?;
                tuple.end()
            }
            Value::Timestamp(ts) => {
                let mut tuple = serializer.serialize_tuple(2)?;
                tuple.serialize_element(&ts.seconds())?;
                tuple.serialize_element(&ts.nanoseconds())?;
                tuple.end()
            }
            Value::Custom(_) => Err(S::Error::custom(
                "custom values need an extension codec; use encode()",
            )),
        }
    }
}

impl Serialize for MapKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MapKey::Int(n) => serializer.serialize_i64(*n),
            MapKey::UInt(n) => serializer.serialize_u64(*n),
            MapKey::Str(s) => serializer.serialize_str(s),
        }
    }
}

struct Bytes<'a>(&'a [u8]);

impl Serialize for Bytes<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> serde::de::Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "any valid MessagePack value")
            }

            fn visit_bool<E>(self, v: bool) -> std::result::Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> std::result::Result<Value, E> {
                Ok(Value::Int(v))
            }

            fn visit_u64<E>(self, v: u64) -> std::result::Result<Value, E> {
                Ok(Value::from(v))
            }

            fn visit_f64<E>(self, v: f64) -> std::result::Result<Value, E> {
                Ok(Value::Float(v))
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<Value, E> {
                Ok(Value::String(v.to_owned()))
            }

            fn visit_string<E>(self, v: String) -> std::result::Result<Value, E> {
                Ok(Value::String(v))
            }

            fn visit_bytes<E>(self, v: &[u8]) -> std::result::Result<Value, E> {
                Ok(Value::Binary(v.to_vec()))
            }

            fn visit_byte_buf<E>(self, v: Vec<u8>) -> std::result::Result<Value, E> {
                Ok(Value::Binary(v))
            }

            fn visit_unit<E>(self) -> std::result::Result<Value, E> {
                Ok(Value::Nil)
            }

            fn visit_none<E>(self) -> std::result::Result<Value, E> {
                Ok(Value::Nil)
            }

            fn visit_some<D: serde::Deserializer<'de>>(
                self,
                deserializer: D,
            ) -> std::result::Result<Value, D::Error> {
                Deserialize::deserialize(deserializer)
            }

            fn visit_seq<A: serde::de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<Value, A::Error> {
                let mut arr = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
                while let Some(elem) = seq.next_element()? {
                    arr.push(elem);
                }
                Ok(Value::Array(arr))
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Value, A::Error> {
                use serde::de::Error as _;

                let mut map = Map::new();
                while let Some((key, val)) = access.next_entry::<Value, Value>()? {
                    let key = match key {
                        Value::String(s) => MapKey::from(s),
                        Value::Int(n) => MapKey::Int(n),
                        Value::UInt(n) => MapKey::UInt(n),
                        other => {
                            return Err(A::Error::custom(format_args!(
                                "invalid map key type: {}",
                                other.type_name()
                            )))
                        }
                    };
                    map.insert(key, val);
                }
                Ok(Value::Map(map))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod lib_tests;
