// ABOUTME: MessagePack encoder writing values depth-first into an OutputBuffer.
// ABOUTME: Always selects the smallest wire form that represents a value exactly.

use crate::buffer::OutputBuffer;
use crate::error::{Error, Result};
use crate::ext::ExtensionCodec;
use crate::types::{limits, marker};
use crate::value::{MapKey, Value};
use std::sync::Arc;

/// Configuration for encoding.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Extension registry consulted for timestamps and custom values
    pub extensions: Arc<ExtensionCodec>,
    /// Maximum value nesting; the top-level value is at depth 1
    pub max_depth: usize,
    /// Initial capacity of the output buffer
    pub initial_buffer_size: usize,
    /// Encode map entries in key order instead of insertion order
    pub sort_keys: bool,
    /// Encode floats as float 32
    pub force_float32: bool,
    /// Encode integers as floats
    pub force_integer_to_float: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            extensions: Arc::new(ExtensionCodec::new()),
            max_depth: limits::MAX_DEPTH,
            initial_buffer_size: limits::INITIAL_BUFFER_SIZE,
            sort_keys: false,
            force_float32: false,
            force_integer_to_float: false,
        }
    }
}

/// A MessagePack encoder.
///
/// The encoder owns its output buffer and can be reused: [`Encoder::encode`]
/// starts fresh each call, while [`Encoder::write`] appends another top-level
/// value after the ones already written.
#[derive(Debug)]
pub struct Encoder {
    buf: OutputBuffer,
    config: EncoderConfig,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    /// Create an encoder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EncoderConfig::default())
    }

    /// Create an encoder with custom configuration.
    #[must_use]
    pub fn with_config(config: EncoderConfig) -> Self {
        Self {
            buf: OutputBuffer::with_capacity(config.initial_buffer_size),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode one value and return its bytes. Anything written before is discarded.
    pub fn encode(&mut self, value: &Value) -> Result<Vec<u8>> {
        self.buf.clear();
        self.write(value)?;
        Ok(self.buf.materialize())
    }

    /// Append one more top-level value to the output.
    ///
    /// On failure the output is left exactly as it was before the call.
    pub fn write(&mut self, value: &Value) -> Result<()> {
        let start = self.buf.len();
        let result = self.encode_value(value, 1);
        if result.is_err() {
            self.buf.truncate(start);
        }
        result
    }

    /// The bytes written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    /// Take the bytes written so far, leaving the encoder empty.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        self.buf.take()
    }

    /// Discard everything written so far.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Encode a value nested at `depth`.
    ///
    /// The extension codec is only consulted for `Timestamp` and `Custom`
    /// values. Every other variant has a built-in MessagePack form, so a
    /// registered encoder never sees arrays, maps or scalars. Wrap such data
    /// in a `Custom` value to give it an extension encoding.
    pub fn encode_value(&mut self, value: &Value, depth: usize) -> Result<()> {
        self.check_depth(depth)?;

        match value {
            Value::Nil => self.write_nil(),
            Value::Bool(b) => self.write_bool(*b),
            Value::Int(n) => self.write_i64(*n),
            Value::UInt(n) => self.write_u64(*n),
            Value::Float(n) => self.write_f64(*n),
            Value::String(s) => self.write_str(s)?,
            Value::Binary(b) => self.write_bin(b)?,
            Value::Array(items) => {
                self.write_array_len(items.len())?;
                for item in items {
                    self.encode_value(item, depth + 1)?;
                }
            }
            Value::Map(map) => {
                self.write_map_len(map.len())?;
                if self.config.sort_keys {
                    let mut entries: Vec<_> = map.iter().collect();
                    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
                    for (key, item) in entries {
                        self.write_key(key)?;
                        self.encode_value(item, depth + 1)?;
                    }
                } else {
                    for (key, item) in map {
                        self.write_key(key)?;
                        self.encode_value(item, depth + 1)?;
                    }
                }
            }
            Value::Ext(ext) => self.write_ext(ext.type_code, &ext.data)?,
            Value::Timestamp(_) | Value::Custom(_) => {
                match self.config.extensions.try_encode(value)? {
                    Some(ext) => self.write_ext(ext.type_code, &ext.data)?,
                    None => {
                        return Err(Error::UnsupportedValue(format!(
                            "no extension registered for {} value",
                            value.type_name()
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.config.max_depth {
            tracing::debug!(depth, max = self.config.max_depth, "encode depth exceeded");
            return Err(Error::MaxDepthExceeded(self.config.max_depth));
        }
        Ok(())
    }

    #[inline]
    fn write_key(&mut self, key: &MapKey) -> Result<()> {
        match key {
            MapKey::Int(n) => self.write_signed_int(*n),
            MapKey::UInt(n) => self.write_unsigned_int(*n),
            MapKey::Str(s) => self.write_str(s)?,
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Primitive writers, shared with the serde serializer
    // -------------------------------------------------------------------------

    #[inline]
    pub(crate) fn write_nil(&mut self) {
        self.buf.push(marker::NIL);
    }

    #[inline]
    pub(crate) fn write_bool(&mut self, value: bool) {
        self.buf.push(if value { marker::TRUE } else { marker::FALSE });
    }

    /// Write a signed integer, honouring `force_integer_to_float`.
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn write_i64(&mut self, value: i64) {
        if self.config.force_integer_to_float {
            self.write_f64(value as f64);
        } else {
            self.write_signed_int(value);
        }
    }

    /// Write an unsigned integer, honouring `force_integer_to_float`.
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn write_u64(&mut self, value: u64) {
        if self.config.force_integer_to_float {
            self.write_f64(value as f64);
        } else {
            self.write_unsigned_int(value);
        }
    }

    #[inline]
    pub(crate) fn write_f32(&mut self, value: f32) {
        self.buf.push(marker::FLOAT32);
        self.buf.append(&value.to_be_bytes());
    }

    /// Write a float as float 64, or float 32 with `force_float32`.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn write_f64(&mut self, value: f64) {
        if self.config.force_float32 {
            self.write_f32(value as f32);
        } else {
            self.buf.push(marker::FLOAT64);
            self.buf.append(&value.to_be_bytes());
        }
    }

    pub(crate) fn write_str(&mut self, value: &str) -> Result<()> {
        let len = value.len();
        if len <= marker::MAX_FIXSTR {
            self.buf.push(marker::FIXSTR | len as u8);
        } else if len <= 0xff {
            self.buf.append(&[marker::STR8, len as u8]);
        } else {
            self.write_sized_header(len, marker::STR16, marker::STR32)?;
        }
        self.buf.append(value.as_bytes());
        Ok(())
    }

    pub(crate) fn write_bin(&mut self, value: &[u8]) -> Result<()> {
        let len = value.len();
        if len <= 0xff {
            self.buf.append(&[marker::BIN8, len as u8]);
        } else {
            self.write_sized_header(len, marker::BIN16, marker::BIN32)?;
        }
        self.buf.append(value);
        Ok(())
    }

    pub(crate) fn write_array_len(&mut self, len: usize) -> Result<()> {
        if len <= marker::MAX_FIX_CONTAINER {
            self.buf.push(marker::FIXARRAY | len as u8);
            Ok(())
        } else {
            self.write_sized_header(len, marker::ARRAY16, marker::ARRAY32)
        }
    }

    pub(crate) fn write_map_len(&mut self, len: usize) -> Result<()> {
        if len <= marker::MAX_FIX_CONTAINER {
            self.buf.push(marker::FIXMAP | len as u8);
            Ok(())
        } else {
            self.write_sized_header(len, marker::MAP16, marker::MAP32)
        }
    }

    pub(crate) fn write_ext(&mut self, type_code: i8, data: &[u8]) -> Result<()> {
        let len = data.len();
        match len {
            1 => self.buf.push(marker::FIXEXT1),
            2 => self.buf.push(marker::FIXEXT2),
            4 => self.buf.push(marker::FIXEXT4),
            8 => self.buf.push(marker::FIXEXT8),
            16 => self.buf.push(marker::FIXEXT16),
            _ if len <= 0xff => self.buf.append(&[marker::EXT8, len as u8]),
            _ => self.write_sized_header(len, marker::EXT16, marker::EXT32)?,
        }
        self.buf.push(type_code as u8);
        self.buf.append(data);
        Ok(())
    }

    /// Write a 16- or 32-bit length-prefixed header.
    fn write_sized_header(&mut self, len: usize, code16: u8, code32: u8) -> Result<()> {
        if let Ok(len) = u16::try_from(len) {
            self.buf.push(code16);
            self.buf.append(&len.to_be_bytes());
        } else if let Ok(len) = u32::try_from(len) {
            self.buf.push(code32);
            self.buf.append(&len.to_be_bytes());
        } else {
            return Err(Error::LengthOverflow(len));
        }
        Ok(())
    }

    /// Write an unsigned integer using the narrowest form.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn write_unsigned_int(&mut self, value: u64) {
        if value <= u64::from(marker::POSFIXINT_MAX) {
            self.buf.push(value as u8);
        } else if value <= 0xff {
            self.buf.append(&[marker::UINT8, value as u8]);
        } else if value <= 0xffff {
            self.buf.push(marker::UINT16);
            self.buf.append(&(value as u16).to_be_bytes());
        } else if value <= 0xffff_ffff {
            self.buf.push(marker::UINT32);
            self.buf.append(&(value as u32).to_be_bytes());
        } else {
            self.buf.push(marker::UINT64);
            self.buf.append(&value.to_be_bytes());
        }
    }

    /// Write a signed integer using the narrowest form.
    /// Non-negative values take the unsigned forms.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    pub(crate) fn write_signed_int(&mut self, value: i64) {
        if value >= 0 {
            self.write_unsigned_int(value as u64);
        } else if value >= -32 {
            // negative fixint
            self.buf.push(value as u8);
        } else if value >= i64::from(i8::MIN) {
            self.buf.append(&[marker::INT8, value as u8]);
        } else if value >= i64::from(i16::MIN) {
            self.buf.push(marker::INT16);
            self.buf.append(&(value as i16).to_be_bytes());
        } else if value >= i64::from(i32::MIN) {
            self.buf.push(marker::INT32);
            self.buf.append(&(value as i32).to_be_bytes());
        } else {
            self.buf.push(marker::INT64);
            self.buf.append(&value.to_be_bytes());
        }
    }
}

// =============================================================================
// Convenience functions
// =============================================================================

/// Serialize any `serde::Serialize` type to MessagePack bytes.
pub fn to_vec<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    to_vec_with_config(value, EncoderConfig::default())
}

/// Serialize with custom configuration.
pub fn to_vec_with_config<T: serde::Serialize + ?Sized>(
    value: &T,
    config: EncoderConfig,
) -> Result<Vec<u8>> {
    let mut encoder = Encoder::with_config(config);
    value.serialize(&mut crate::ser::Serializer::new(&mut encoder))?;
    Ok(encoder.take_bytes())
}
