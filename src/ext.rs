// ABOUTME: Extension registry mapping application values to signed 8-bit type codes and back.
// ABOUTME: Ships the MessagePack timestamp extension (type -1) as a built-in registration.

use crate::error::{Error, Result};
use crate::value::Value;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Type code of the MessagePack timestamp extension.
pub const TIMESTAMP_TYPE: i8 = -1;

/// A raw extension value: a type code and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Extension {
    pub type_code: i8,
    pub data: Vec<u8>,
}

impl Extension {
    pub fn new(type_code: i8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            type_code,
            data: data.into(),
        }
    }
}

/// Seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    seconds: i64,
    nanoseconds: u32,
}

impl Timestamp {
    /// Create a timestamp. Fails if `nanoseconds` is not below one second.
    pub fn new(seconds: i64, nanoseconds: u32) -> Result<Self> {
        if nanoseconds >= 1_000_000_000 {
            return Err(Error::InvalidData(format!(
                "timestamp nanoseconds out of range: {nanoseconds}"
            )));
        }
        Ok(Self {
            seconds,
            nanoseconds,
        })
    }

    #[must_use]
    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    #[must_use]
    pub fn nanoseconds(&self) -> u32 {
        self.nanoseconds
    }

    /// Encode as the smallest of timestamp 32, 64 or 96.
    #[must_use]
    #[allow(clippy::cast_sign_loss)] // Range checked before cast
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.seconds >= 0 && self.seconds >> 34 == 0 {
            let seconds = self.seconds as u64;
            if self.nanoseconds == 0 && seconds >> 32 == 0 {
                // timestamp 32
                return (seconds as u32).to_be_bytes().to_vec();
            }
            // timestamp 64
            let packed = (u64::from(self.nanoseconds) << 34) | seconds;
            return packed.to_be_bytes().to_vec();
        }
        // timestamp 96
        let mut out = Vec::with_capacity(12);
        out.extend_from_slice(&self.nanoseconds.to_be_bytes());
        out.extend_from_slice(&self.seconds.to_be_bytes());
        out
    }

    /// Decode a timestamp 32, 64 or 96 payload.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_possible_wrap)]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        match *data {
            [a, b, c, d] => Ok(Self {
                seconds: i64::from(u32::from_be_bytes([a, b, c, d])),
                nanoseconds: 0,
            }),
            [a, b, c, d, e, f, g, h] => {
                let packed = u64::from_be_bytes([a, b, c, d, e, f, g, h]);
                Self::new((packed & 0x3_ffff_ffff) as i64, (packed >> 34) as u32)
            }
            [a, b, c, d, e, f, g, h, i, j, k, l] => Self::new(
                i64::from_be_bytes([e, f, g, h, i, j, k, l]),
                u32::from_be_bytes([a, b, c, d]),
            ),
            _ => Err(Error::InvalidData(format!(
                "unrecognized timestamp payload size: {}",
                data.len()
            ))),
        }
    }
}

impl TryFrom<SystemTime> for Timestamp {
    type Error = Error;

    fn try_from(time: SystemTime) -> Result<Self> {
        let (seconds, nanoseconds) = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => (i64::try_from(after.as_secs()), after.subsec_nanos()),
            Err(before) => {
                let before = before.duration();
                let secs = i64::try_from(before.as_secs()).map(|s| -s);
                match before.subsec_nanos() {
                    0 => (secs, 0),
                    n => (secs.map(|s| s - 1), 1_000_000_000 - n),
                }
            }
        };
        let seconds =
            seconds.map_err(|_| Error::InvalidData("time out of timestamp range".into()))?;
        Self::new(seconds, nanoseconds)
    }
}

impl From<Timestamp> for SystemTime {
    #[allow(clippy::cast_sign_loss)] // Sign checked before cast
    fn from(ts: Timestamp) -> Self {
        if ts.seconds >= 0 {
            UNIX_EPOCH + Duration::new(ts.seconds as u64, ts.nanoseconds)
        } else {
            UNIX_EPOCH - Duration::from_secs(ts.seconds.unsigned_abs())
                + Duration::from_nanos(u64::from(ts.nanoseconds))
        }
    }
}

type EncodeFn = dyn Fn(&Value) -> Option<Result<Vec<u8>>> + Send + Sync;
type DecodeFn = dyn Fn(&[u8], i8) -> Result<Value> + Send + Sync;

struct Registration {
    type_code: i8,
    encode: Box<EncodeFn>,
    decode: Box<DecodeFn>,
}

/// Registry of extension types.
///
/// Encoders are tried in registration order (built-ins first); the first one
/// that claims a value supplies its type code and payload. Decoders are
/// looked up by type code.
///
/// Handlers that need context should capture it in the closure.
pub struct ExtensionCodec {
    registrations: Vec<Registration>,
}

impl Default for ExtensionCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionCodec {
    /// Create a registry holding the built-in timestamp extension.
    #[must_use]
    pub fn new() -> Self {
        let mut codec = Self::empty();
        codec.register(
            TIMESTAMP_TYPE,
            |value| match value {
                Value::Timestamp(ts) => Some(Ok(ts.to_bytes())),
                _ => None,
            },
            |data, _| Timestamp::from_bytes(data).map(Value::Timestamp),
        );
        codec
    }

    /// Create a registry with no extensions at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Register an extension type.
    ///
    /// `encode` returns `None` for values it does not claim. Registering a
    /// type code twice replaces the earlier handlers in place.
    pub fn register<E, D>(&mut self, type_code: i8, encode: E, decode: D)
    where
        E: Fn(&Value) -> Option<Result<Vec<u8>>> + Send + Sync + 'static,
        D: Fn(&[u8], i8) -> Result<Value> + Send + Sync + 'static,
    {
        let registration = Registration {
            type_code,
            encode: Box::new(encode),
            decode: Box::new(decode),
        };
        match self
            .registrations
            .iter_mut()
            .find(|r| r.type_code == type_code)
        {
            Some(slot) => *slot = registration,
            None => self.registrations.push(registration),
        }
    }

    /// Register `type_code` so that its payloads decode as plain [`Value::Ext`].
    pub fn register_raw(&mut self, type_code: i8) {
        self.register(
            type_code,
            |_| None,
            |data, type_code| Ok(Value::Ext(Extension::new(type_code, data))),
        );
    }

    /// Returns true if a decoder is registered for `type_code`.
    #[must_use]
    pub fn is_registered(&self, type_code: i8) -> bool {
        self.registrations.iter().any(|r| r.type_code == type_code)
    }

    /// Try each registered encoder in order. `Ok(None)` means no extension
    /// claims the value.
    ///
    /// The encoder calls this for `Timestamp` and `Custom` values only.
    pub fn try_encode(&self, value: &Value) -> Result<Option<Extension>> {
        for registration in &self.registrations {
            if let Some(data) = (registration.encode)(value) {
                return Ok(Some(Extension::new(registration.type_code, data?)));
            }
        }
        Ok(None)
    }

    /// Decode an extension payload with the decoder registered for `type_code`.
    pub fn decode(&self, data: &[u8], type_code: i8) -> Result<Value> {
        match self.registrations.iter().find(|r| r.type_code == type_code) {
            Some(registration) => (registration.decode)(data, type_code),
            None => {
                tracing::debug!(type_code, "no decoder registered for extension type");
                Err(Error::UnsupportedExtension(type_code))
            }
        }
    }
}

impl fmt::Debug for ExtensionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.registrations.iter().map(|r| r.type_code))
            .finish()
    }
}
