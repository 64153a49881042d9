// ABOUTME: MessagePack decoding state machine with an explicit frame stack in place of recursion.
// ABOUTME: The same machine backs the in-memory Decoder and the incremental StreamDecoder.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]

use crate::error::{Error, LengthKind, Result};
use crate::ext::ExtensionCodec;
use crate::key_cache::{KeyCache, SharedKeyCache};
use crate::types::{limits, marker};
use crate::value::{Map, MapKey, Value};
use std::iter::FusedIterator;
use std::sync::Arc;

/// Validate and convert bytes to a UTF-8 string.
/// Uses simdutf8 for SIMD-accelerated validation when the feature is enabled.
#[cfg(feature = "simd-utf8")]
#[inline]
pub(crate) fn validate_utf8(bytes: &[u8]) -> Result<&str> {
    simdutf8::basic::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
}

#[cfg(not(feature = "simd-utf8"))]
#[inline]
pub(crate) fn validate_utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
}

/// Map keys that are always rejected.
const FORBIDDEN_KEY: &str = "__proto__";

/// Which key cache a decoder uses.
#[derive(Debug, Clone, Default)]
pub enum KeyCaching {
    /// Decode every key afresh
    Disabled,
    /// Each decoder owns a private cache (default)
    #[default]
    PerDecoder,
    /// Use a cache shared with other decoders
    Shared(SharedKeyCache),
}

/// Configuration options for the decoder.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Extension registry used to decode extension payloads
    pub extensions: Arc<ExtensionCodec>,
    /// Cache used for short string keys
    pub key_cache: KeyCaching,
    /// Maximum string length in bytes
    pub max_str_length: usize,
    /// Maximum binary length in bytes
    pub max_bin_length: usize,
    /// Maximum number of array elements
    pub max_array_length: usize,
    /// Maximum number of map pairs
    pub max_map_length: usize,
    /// Maximum extension payload length in bytes
    pub max_ext_length: usize,
    /// Initial size of the stream decoder's scratch buffer
    pub initial_buffer_size: usize,
    /// Decode strings (other than map keys) as binary without UTF-8 validation
    pub raw_strings: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            extensions: Arc::new(ExtensionCodec::new()),
            key_cache: KeyCaching::default(),
            max_str_length: limits::MAX_LENGTH,
            max_bin_length: limits::MAX_LENGTH,
            max_array_length: limits::MAX_LENGTH,
            max_map_length: limits::MAX_LENGTH,
            max_ext_length: limits::MAX_LENGTH,
            initial_buffer_size: limits::INITIAL_BUFFER_SIZE,
            raw_strings: false,
        }
    }
}

impl DecoderConfig {
    fn max_length(&self, kind: LengthKind) -> usize {
        match kind {
            LengthKind::Str => self.max_str_length,
            LengthKind::Bin => self.max_bin_length,
            LengthKind::Array => self.max_array_length,
            LengthKind::Map => self.max_map_length,
            LengthKind::Ext => self.max_ext_length,
        }
    }

    /// Fail if a declared length exceeds its configured maximum.
    #[inline]
    fn check_length(&self, kind: LengthKind, length: usize) -> Result<()> {
        let max = self.max_length(kind);
        if length > max {
            tracing::debug!(%kind, length, max, "declared length exceeds limit");
            return Err(Error::LengthLimitExceeded {
                kind,
                length: length as u64,
                max,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Input
// =============================================================================

/// A read cursor over the bytes currently available.
///
/// Every read is all-or-nothing: when the bytes are not there, the cursor
/// stays put and `wanted` records how many bytes (from the cursor) the read
/// needed.
pub(crate) struct Input<'a> {
    data: &'a [u8],
    pos: usize,
    wanted: usize,
}

impl<'a> Input<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            wanted: 0,
        }
    }

    #[inline]
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Bytes from the cursor that the last failed read needed.
    #[inline]
    pub(crate) fn wanted(&self) -> usize {
        self.wanted
    }

    #[inline]
    fn peek(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            self.wanted = n;
            return Err(Error::InsufficientData);
        }
        Ok(&self.data[self.pos..self.pos + n])
    }

    #[inline]
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self.peek(n)?;
        self.pos += n;
        Ok(bytes)
    }

    /// Read a big-endian length field of `width` bytes at `offset` without consuming it.
    #[inline]
    fn peek_length(&mut self, offset: usize, width: usize) -> Result<usize> {
        let b = &self.peek(offset + width)?[offset..];
        Ok(match width {
            1 => usize::from(b[0]),
            2 => usize::from(u16::from_be_bytes([b[0], b[1]])),
            _ => u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize,
        })
    }

    /// Consume a `width` byte prefix plus `len` payload bytes, returning the payload.
    #[inline]
    fn take_prefixed(&mut self, width: usize, len: usize) -> Result<&'a [u8]> {
        Ok(&self.take(width + len)?[width..])
    }
}

// =============================================================================
// State machine
// =============================================================================

/// A container under construction.
enum Frame {
    Array {
        items: Vec<Value>,
        size: usize,
    },
    Map {
        entries: Map,
        size: usize,
        read: usize,
        /// Set while awaiting the value for this key
        key: Option<MapKey>,
    },
}

/// Result of interpreting one header byte.
enum Step {
    Value(Value),
    Array(usize),
    Map(usize),
}

enum Keys {
    Uncached,
    Owned(KeyCache),
    Shared(SharedKeyCache),
}

impl Keys {
    fn new(caching: &KeyCaching) -> Self {
        match caching {
            KeyCaching::Disabled => Keys::Uncached,
            KeyCaching::PerDecoder => Keys::Owned(KeyCache::new()),
            KeyCaching::Shared(cache) => Keys::Shared(cache.clone()),
        }
    }

    #[inline]
    fn decode(&mut self, bytes: &[u8]) -> Result<Arc<str>> {
        match self {
            Keys::Uncached => Ok(Arc::from(validate_utf8(bytes)?)),
            Keys::Owned(cache) => cache.decode(bytes),
            Keys::Shared(cache) => cache.decode(bytes),
        }
    }
}

/// The decoding state that survives between calls: frame stack, the
/// head byte of a value whose body has not arrived yet, and the key cache.
pub(crate) struct StateMachine {
    config: DecoderConfig,
    stack: Vec<Frame>,
    head_byte: Option<u8>,
    keys: Keys,
}

impl StateMachine {
    pub(crate) fn new(config: DecoderConfig) -> Self {
        Self {
            keys: Keys::new(&config.key_cache),
            config,
            stack: Vec::new(),
            head_byte: None,
        }
    }

    #[inline]
    pub(crate) fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Forget any partially decoded value.
    pub(crate) fn reset(&mut self) {
        self.stack.clear();
        self.head_byte = None;
    }

    /// True when no value is partially decoded.
    #[inline]
    pub(crate) fn is_idle(&self) -> bool {
        self.stack.is_empty() && self.head_byte.is_none()
    }

    /// Decode one value, resuming wherever the previous call stopped.
    ///
    /// On `InsufficientData` the state is kept so that the call can be repeated
    /// once more input is available; bytes consumed so far stay consumed.
    pub(crate) fn run(&mut self, input: &mut Input<'_>) -> Result<Value> {
        loop {
            let head = match self.head_byte {
                Some(head) => head,
                None => {
                    let head = input.take(1)?[0];
                    self.head_byte = Some(head);
                    head
                }
            };

            if let Some(Frame::Map { key: pending, .. }) = self.stack.last_mut() {
                if pending.is_none() {
                    *pending = Some(read_key(&self.config, &mut self.keys, head, input)?);
                    self.head_byte = None;
                    continue;
                }
            }

            let completed = match read_step(&self.config, head, input)? {
                Step::Value(value) => value,
                Step::Array(0) => Value::Array(Vec::new()),
                Step::Map(0) => Value::Map(Map::new()),
                Step::Array(size) => {
                    self.head_byte = None;
                    self.stack.push(Frame::Array {
                        items: Vec::with_capacity(size.min(input.remaining())),
                        size,
                    });
                    continue;
                }
                Step::Map(size) => {
                    self.head_byte = None;
                    self.stack.push(Frame::Map {
                        entries: Map::with_capacity(size.min(input.remaining() / 2)),
                        size,
                        read: 0,
                        key: None,
                    });
                    continue;
                }
            };
            self.head_byte = None;

            if let Some(value) = self.complete(completed) {
                return Ok(value);
            }
        }
    }

    /// Hand a finished value to the enclosing frame, popping every frame it
    /// fills. Returns the top-level value once the stack is empty.
    fn complete(&mut self, mut value: Value) -> Option<Value> {
        loop {
            match self.stack.last_mut() {
                None => return Some(value),
                Some(Frame::Array { items, size }) => {
                    items.push(value);
                    if items.len() < *size {
                        return None;
                    }
                }
                Some(Frame::Map {
                    entries,
                    size,
                    read,
                    key,
                }) => {
                    if let Some(key) = key.take() {
                        entries.insert(key, value);
                    }
                    *read += 1;
                    if *read < *size {
                        return None;
                    }
                }
            }
            value = match self.stack.pop() {
                Some(Frame::Array { items, .. }) => Value::Array(items),
                Some(Frame::Map { entries, .. }) => Value::Map(entries),
                None => return None,
            };
        }
    }

    /// Consume a top-level array header and return its declared length.
    pub(crate) fn read_array_header(&mut self, input: &mut Input<'_>) -> Result<usize> {
        let head = input.peek(1)?[0];
        let len = match head {
            marker::FIXARRAY..=marker::FIXARRAY_MAX => {
                input.take(1)?;
                marker::inline_size(head)
            }
            marker::ARRAY16 | marker::ARRAY32 => {
                let width = marker::length_width(head);
                let len = input.peek_length(1, width)?;
                input.take(1 + width)?;
                len
            }
            _ => {
                return Err(Error::UnexpectedType {
                    expected: "array",
                    found: marker::family(head),
                })
            }
        };
        self.config.check_length(LengthKind::Array, len)?;
        Ok(len)
    }
}

/// Interpret a header byte whose body (if any) follows in `input`.
/// The body is read in one piece or not at all.
fn read_step(config: &DecoderConfig, head: u8, input: &mut Input<'_>) -> Result<Step> {
    let value = match head {
        0x00..=marker::POSFIXINT_MAX | marker::NEGFIXINT..=0xff => {
            Value::Int(i64::from(marker::fixint_value(head)))
        }
        marker::FIXMAP..=marker::FIXMAP_MAX => {
            let size = marker::inline_size(head);
            config.check_length(LengthKind::Map, size)?;
            return Ok(Step::Map(size));
        }
        marker::FIXARRAY..=marker::FIXARRAY_MAX => {
            let size = marker::inline_size(head);
            config.check_length(LengthKind::Array, size)?;
            return Ok(Step::Array(size));
        }
        marker::FIXSTR..=marker::FIXSTR_MAX => {
            let len = marker::inline_size(head);
            config.check_length(LengthKind::Str, len)?;
            string_value(config, input.take(len)?)?
        }
        marker::NIL => Value::Nil,
        marker::FALSE => Value::Bool(false),
        marker::TRUE => Value::Bool(true),
        marker::BIN8..=marker::BIN32 => {
            let width = marker::length_width(head);
            let len = input.peek_length(0, width)?;
            config.check_length(LengthKind::Bin, len)?;
            Value::Binary(input.take_prefixed(width, len)?.to_vec())
        }
        marker::EXT8..=marker::EXT32 => {
            let width = marker::length_width(head);
            let len = input.peek_length(0, width)?;
            config.check_length(LengthKind::Ext, len)?;
            ext_value(config, input.take_prefixed(width, 1 + len)?)?
        }
        marker::FIXEXT1..=marker::FIXEXT16 => {
            let len = marker::fixext_size(head);
            config.check_length(LengthKind::Ext, len)?;
            ext_value(config, input.take(1 + len)?)?
        }
        marker::FLOAT32 => {
            let bytes = input.take(4)?;
            Value::Float(f64::from(f32::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ])))
        }
        marker::FLOAT64 => Value::Float(f64::from_bits(read_u64(input.take(8)?))),
        marker::UINT8..=marker::UINT64 => {
            Value::from(read_u64(input.take(marker::number_width(head))?))
        }
        marker::INT8..=marker::INT64 => {
            Value::Int(read_i64(input.take(marker::number_width(head))?))
        }
        marker::STR8..=marker::STR32 => {
            let width = marker::length_width(head);
            let len = input.peek_length(0, width)?;
            config.check_length(LengthKind::Str, len)?;
            string_value(config, input.take_prefixed(width, len)?)?
        }
        marker::ARRAY16 | marker::ARRAY32 => {
            let len = input.peek_length(0, marker::length_width(head))?;
            config.check_length(LengthKind::Array, len)?;
            input.take(marker::length_width(head))?;
            return Ok(Step::Array(len));
        }
        marker::MAP16 | marker::MAP32 => {
            let len = input.peek_length(0, marker::length_width(head))?;
            config.check_length(LengthKind::Map, len)?;
            input.take(marker::length_width(head))?;
            return Ok(Step::Map(len));
        }
        _ => return Err(Error::InvalidHeaderByte(head)),
    };
    Ok(Step::Value(value))
}

/// Read a map key: a string (through the key cache) or an integer.
fn read_key(
    config: &DecoderConfig,
    keys: &mut Keys,
    head: u8,
    input: &mut Input<'_>,
) -> Result<MapKey> {
    if !marker::is_key(head) {
        return Err(Error::InvalidMapKey(marker::family(head)));
    }

    let bytes = if marker::is_fixstr(head) {
        let len = marker::inline_size(head);
        config.check_length(LengthKind::Str, len)?;
        input.take(len)?
    } else if marker::is_str(head) {
        let width = marker::length_width(head);
        let len = input.peek_length(0, width)?;
        config.check_length(LengthKind::Str, len)?;
        input.take_prefixed(width, len)?
    } else {
        return match read_step(config, head, input)? {
            Step::Value(Value::Int(n)) => Ok(MapKey::Int(n)),
            Step::Value(Value::UInt(n)) => Ok(MapKey::UInt(n)),
            _ => Err(Error::InvalidMapKey(marker::family(head))),
        };
    };

    if bytes == FORBIDDEN_KEY.as_bytes() {
        tracing::debug!("rejecting forbidden map key");
        return Err(Error::ForbiddenKey);
    }
    Ok(MapKey::Str(keys.decode(bytes)?))
}

#[inline]
fn string_value(config: &DecoderConfig, bytes: &[u8]) -> Result<Value> {
    if config.raw_strings {
        return Ok(Value::Binary(bytes.to_vec()));
    }
    Ok(Value::String(validate_utf8(bytes)?.to_owned()))
}

/// Decode a type code byte followed by an extension payload.
#[inline]
fn ext_value(config: &DecoderConfig, bytes: &[u8]) -> Result<Value> {
    let type_code = bytes[0] as i8;
    config.extensions.decode(&bytes[1..], type_code)
}

#[inline]
fn read_u64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b))
}

/// Read a big-endian two's complement integer of 1, 2, 4 or 8 bytes.
#[inline]
fn read_i64(bytes: &[u8]) -> i64 {
    let shift = 64 - 8 * bytes.len() as u32;
    ((read_u64(bytes) << shift) as i64) >> shift
}

// =============================================================================
// Decoder
// =============================================================================

/// A MessagePack decoder that reads values from a byte slice.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    machine: StateMachine,
}

impl<'a> Decoder<'a> {
    /// Create a new decoder for the given data.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_config(data, DecoderConfig::default())
    }

    /// Create a new decoder with custom configuration.
    #[must_use]
    pub fn with_config(data: &'a [u8], config: DecoderConfig) -> Self {
        Self {
            data,
            pos: 0,
            machine: StateMachine::new(config),
        }
    }

    /// Get the current position in the input.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get the remaining bytes.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Check if we've reached the end of input.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get the decoder configuration.
    #[must_use]
    pub fn config(&self) -> &DecoderConfig {
        self.machine.config()
    }

    /// Decode the next complete value.
    pub fn decode_value(&mut self) -> Result<Value> {
        self.machine.reset();
        let mut input = Input::new(&self.data[self.pos..]);
        let result = self.machine.run(&mut input);
        self.pos += input.position();
        result
    }

    /// Verify that all input has been consumed.
    pub fn finish(&self) -> Result<()> {
        match self.data.len() - self.pos {
            0 => Ok(()),
            n => Err(Error::TrailingBytes(n)),
        }
    }

    /// Iterate over all remaining top-level values.
    #[must_use]
    pub fn into_values(self) -> DecodeMulti<'a> {
        DecodeMulti {
            decoder: self,
            done: false,
        }
    }
}

/// Iterator over successive top-level values in one buffer.
///
/// Stops after the last complete value, or after yielding the first error.
pub struct DecodeMulti<'a> {
    decoder: Decoder<'a>,
    done: bool,
}

impl Iterator for DecodeMulti<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.decoder.is_empty() {
            return None;
        }
        let result = self.decoder.decode_value();
        self.done = result.is_err();
        Some(result)
    }
}

impl FusedIterator for DecodeMulti<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::Extension;
    use crate::msgpack;

    fn dec(data: &[u8]) -> Result<Value> {
        let mut decoder = Decoder::new(data);
        let value = decoder.decode_value()?;
        decoder.finish()?;
        Ok(value)
    }

    #[test]
    fn test_decode_fixints() {
        assert_eq!(dec(&[0x00]).unwrap(), Value::Int(0));
        assert_eq!(dec(&[0x7f]).unwrap(), Value::Int(127));
        assert_eq!(dec(&[0xff]).unwrap(), Value::Int(-1));
        assert_eq!(dec(&[0xe0]).unwrap(), Value::Int(-32));
    }

    #[test]
    fn test_decode_sized_ints() {
        assert_eq!(dec(&[0xcc, 0xff]).unwrap(), Value::Int(255));
        assert_eq!(dec(&[0xcd, 0x01, 0x00]).unwrap(), Value::Int(256));
        assert_eq!(dec(&[0xd0, 0x80]).unwrap(), Value::Int(-128));
        assert_eq!(dec(&[0xd1, 0xff, 0x7f]).unwrap(), Value::Int(-129));
        assert_eq!(
            dec(&[0xd2, 0x80, 0, 0, 0]).unwrap(),
            Value::Int(i64::from(i32::MIN))
        );
        assert_eq!(
            dec(&[0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).unwrap(),
            Value::UInt(u64::MAX)
        );
        assert_eq!(
            dec(&[0xcf, 0, 0, 0, 0, 0, 0, 0, 1]).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            dec(&[0xd3, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]).unwrap(),
            Value::Int(-2)
        );
    }

    #[test]
    fn test_read_i64_sign_extends() {
        assert_eq!(read_i64(&[0xfe]), -2);
        assert_eq!(read_i64(&[0x7f, 0xff]), 32767);
        assert_eq!(read_i64(&[0x80, 0x00, 0x00, 0x00]), i64::from(i32::MIN));
    }

    #[test]
    fn test_decode_nil_bool_float() {
        assert_eq!(dec(&[0xc0]).unwrap(), Value::Nil);
        assert_eq!(dec(&[0xc2]).unwrap(), Value::Bool(false));
        assert_eq!(dec(&[0xc3]).unwrap(), Value::Bool(true));
        assert_eq!(
            dec(&[0xca, 0x3f, 0xc0, 0x00, 0x00]).unwrap(),
            Value::Float(1.5)
        );
        let mut data = vec![0xcb];
        data.extend_from_slice(&0.1f64.to_be_bytes());
        assert_eq!(dec(&data).unwrap(), Value::Float(0.1));
    }

    #[test]
    fn test_decode_strings_and_binary() {
        assert_eq!(dec(&[0xa0]).unwrap(), Value::from(""));
        assert_eq!(dec(&[0xa1, 0x78]).unwrap(), Value::from("x"));
        assert_eq!(dec(&[0xd9, 0x02, 0x68, 0x69]).unwrap(), Value::from("hi"));
        assert_eq!(
            dec(&[0xda, 0x00, 0x01, 0x7a]).unwrap(),
            Value::from("z")
        );
        assert_eq!(
            dec(&[0xc4, 0x02, 0x01, 0x02]).unwrap(),
            Value::Binary(vec![1, 2])
        );
        assert_eq!(dec(&[0xa1, 0xff]), Err(Error::InvalidUtf8));
    }

    #[test]
    fn test_raw_strings() {
        let config = DecoderConfig {
            raw_strings: true,
            ..Default::default()
        };
        let data = [0x81, 0xa1, 0x6b, 0xa2, 0xff, 0xfe];
        let value = Decoder::with_config(&data, config).decode_value().unwrap();
        assert_eq!(value.get_key("k"), Some(&Value::Binary(vec![0xff, 0xfe])));
    }

    #[test]
    fn test_decode_containers() {
        assert_eq!(dec(&[0x93, 0x01, 0x02, 0x03]).unwrap(), msgpack!([1, 2, 3]));
        assert_eq!(dec(&[0x81, 0xa1, 0x61, 0x01]).unwrap(), msgpack!({"a": 1}));
        assert_eq!(dec(&[0x90]).unwrap(), msgpack!([]));
        assert_eq!(dec(&[0x80]).unwrap(), Value::Map(Map::new()));
        assert_eq!(
            dec(&[0xdc, 0x00, 0x02, 0xc3, 0xc2]).unwrap(),
            msgpack!([true, false])
        );
        // {"a": [[], {}], "b": nil}
        let data = [0x82, 0xa1, 0x61, 0x92, 0x90, 0x80, 0xa1, 0x62, 0xc0];
        assert_eq!(
            dec(&data).unwrap(),
            msgpack!({"a": [[], {}], "b": nil})
        );
    }

    #[test]
    fn test_integer_keys() {
        let value = dec(&[0x82, 0x01, 0xc3, 0xff, 0xc2]).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.get(&MapKey::Int(1)), Some(&Value::Bool(true)));
        assert_eq!(map.get(&MapKey::Int(-1)), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let value = dec(&[0x82, 0xa1, 0x61, 0x01, 0xa1, 0x61, 0x02]).unwrap();
        assert_eq!(value, msgpack!({"a": 2}));
    }

    #[test]
    fn test_deep_nesting_without_recursion() {
        let depth = 100_000;
        let mut data = vec![0x91; depth];
        data.push(0xc0);
        let mut value = dec(&data).unwrap();
        let mut levels = 0;
        while let Value::Array(mut items) = value {
            levels += 1;
            value = items.pop().unwrap_or_default();
        }
        assert_eq!(levels, depth);
        assert_eq!(value, Value::Nil);
    }

    #[test]
    fn test_invalid_keys() {
        assert_eq!(
            dec(&[0x81, 0xc0, 0x01]),
            Err(Error::InvalidMapKey("nil"))
        );
        assert_eq!(
            dec(&[0x81, 0x90, 0x01]),
            Err(Error::InvalidMapKey("array"))
        );
        assert_eq!(
            dec(&[0x81, 0xcb, 0, 0, 0, 0, 0, 0, 0, 0, 0x01]),
            Err(Error::InvalidMapKey("float"))
        );
    }

    #[test]
    fn test_forbidden_key() {
        let mut data = vec![0x81, 0xa9];
        data.extend_from_slice(b"__proto__");
        data.push(0x01);
        assert_eq!(dec(&data), Err(Error::ForbiddenKey));

        // Also when written with a longer header
        let mut data = vec![0x81, 0xd9, 0x09];
        data.extend_from_slice(b"__proto__");
        data.push(0x01);
        assert_eq!(dec(&data), Err(Error::ForbiddenKey));

        // As a plain string value it is fine
        let mut data = vec![0xa9];
        data.extend_from_slice(b"__proto__");
        assert_eq!(dec(&data).unwrap(), Value::from("__proto__"));
    }

    #[test]
    fn test_reserved_header() {
        assert_eq!(dec(&[0xc1]), Err(Error::InvalidHeaderByte(0xc1)));
    }

    #[test]
    fn test_limits_checked_before_payload() {
        let config = DecoderConfig {
            max_array_length: 2,
            max_str_length: 3,
            ..Default::default()
        };
        // Declared 4 billion elements with no payload at all
        let err = Decoder::with_config(&[0xdd, 0xff, 0xff, 0xff, 0xff], config.clone())
            .decode_value()
            .unwrap_err();
        assert_eq!(
            err,
            Error::LengthLimitExceeded {
                kind: LengthKind::Array,
                length: 0xffff_ffff,
                max: 2
            }
        );

        let err = Decoder::with_config(&[0xa4], config)
            .decode_value()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::LengthLimitExceeded {
                kind: LengthKind::Str,
                ..
            }
        ));
    }

    #[test]
    fn test_truncated() {
        assert_eq!(dec(&[]), Err(Error::InsufficientData));
        assert_eq!(dec(&[0x93, 0x01]), Err(Error::InsufficientData));
        assert_eq!(dec(&[0xcd, 0x01]), Err(Error::InsufficientData));
        assert_eq!(dec(&[0xd9, 0x05, 0x61]), Err(Error::InsufficientData));
    }

    #[test]
    fn test_trailing_bytes() {
        assert_eq!(dec(&[0xc0, 0xc0, 0xc0]), Err(Error::TrailingBytes(2)));
    }

    #[test]
    fn test_extensions() {
        // fixext 4 with type -1 is a timestamp 32
        let value = dec(&[0xd6, 0xff, 0x00, 0x00, 0x00, 0x05]).unwrap();
        match value {
            Value::Timestamp(ts) => assert_eq!((ts.seconds(), ts.nanoseconds()), (5, 0)),
            other => panic!("expected timestamp, got {other:?}"),
        }

        assert_eq!(
            dec(&[0xd4, 0x05, 0x00]),
            Err(Error::UnsupportedExtension(5))
        );

        let mut codec = ExtensionCodec::new();
        codec.register_raw(5);
        let config = DecoderConfig {
            extensions: Arc::new(codec),
            ..Default::default()
        };
        let value = Decoder::with_config(&[0xc7, 0x01, 0x05, 0xaa], config)
            .decode_value()
            .unwrap();
        assert_eq!(value, Value::Ext(Extension::new(5, vec![0xaa])));
    }

    #[test]
    fn test_fix_container_sizes_respect_limits() {
        let config = DecoderConfig {
            max_array_length: 1,
            max_map_length: 1,
            ..Default::default()
        };
        let nested = [0x91, 0x92, 0x01, 0x02];
        assert_eq!(
            Decoder::with_config(&nested, config.clone()).decode_value(),
            Err(Error::LengthLimitExceeded {
                kind: LengthKind::Array,
                length: 2,
                max: 1
            })
        );

        let map = [0x82, 0x01, 0xc0, 0x02, 0xc0];
        assert_eq!(
            Decoder::with_config(&map, config.clone()).decode_value(),
            Err(Error::LengthLimitExceeded {
                kind: LengthKind::Map,
                length: 2,
                max: 1
            })
        );

        let fits = [0x91, 0x81, 0x01, 0xc0];
        assert!(Decoder::with_config(&fits, config).decode_value().is_ok());
    }

    #[test]
    fn test_input_is_atomic() {
        let mut input = Input::new(&[0xd9, 0x04, 0x61]);
        assert_eq!(input.take(1).unwrap(), &[0xd9]);
        assert_eq!(input.peek_length(0, 1).unwrap(), 4);
        assert_eq!(input.take_prefixed(1, 4), Err(Error::InsufficientData));
        assert_eq!(input.wanted(), 5);
        assert_eq!(input.position(), 1);
    }

    #[test]
    fn test_resume_after_insufficient_data() {
        let full = [0x92, 0xa2, 0x68, 0x69, 0xcd, 0x01, 0x00];
        let mut machine = StateMachine::new(DecoderConfig::default());

        // First attempt sees the array header and half of the string
        let mut input = Input::new(&full[..3]);
        assert_eq!(machine.run(&mut input), Err(Error::InsufficientData));
        // Array header and string header are consumed; the string body is not
        assert_eq!(input.position(), 2);
        assert_eq!(input.wanted(), 2);
        assert!(!machine.is_idle());

        let mut input = Input::new(&full[2..]);
        assert_eq!(machine.run(&mut input).unwrap(), msgpack!(["hi", 256]));
        assert!(machine.is_idle());
    }

    #[test]
    fn test_decode_multi() {
        let data = [0x01, 0xa1, 0x62, 0x91, 0xc0];
        let values: Vec<_> = Decoder::new(&data)
            .into_values()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(values, vec![Value::Int(1), Value::from("b"), msgpack!([nil])]);

        let mut iter = Decoder::new(&[0x01, 0xc1, 0x02]).into_values();
        assert_eq!(iter.next(), Some(Ok(Value::Int(1))));
        assert_eq!(iter.next(), Some(Err(Error::InvalidHeaderByte(0xc1))));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_shared_key_cache() {
        let cache = SharedKeyCache::new();
        let config = DecoderConfig {
            key_cache: KeyCaching::Shared(cache.clone()),
            ..Default::default()
        };
        let data = [0x81, 0xa2, 0x69, 0x64, 0x01];
        for _ in 0..3 {
            Decoder::with_config(&data, config.clone())
                .decode_value()
                .unwrap();
        }
        assert_eq!((cache.misses(), cache.hits()), (1, 2));
    }
}
