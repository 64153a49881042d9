// ABOUTME: Error types for MessagePack encoding and decoding.
// ABOUTME: Every variant belongs to one ErrorKind so callers can tell "need more bytes" from "corrupt".

use std::fmt;

/// The result type for MessagePack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or policy-violating input.
    Decode,
    /// The input ended before a declared length was satisfied.
    InsufficientData,
    /// Value nesting exceeded the configured maximum while encoding.
    DepthExceeded,
    /// The value matches no wire format and no registered extension.
    UnsupportedValue,
    /// The pull source failed.
    Io,
}

/// The kind of declared length that was checked against a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthKind {
    Str,
    Bin,
    Array,
    Map,
    Ext,
}

impl fmt::Display for LengthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LengthKind::Str => "string",
            LengthKind::Bin => "binary",
            LengthKind::Array => "array",
            LengthKind::Map => "map",
            LengthKind::Ext => "extension",
        })
    }
}

/// Errors that can occur during MessagePack encoding or decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The input ran out before the current value was complete.
    #[error("insufficient data")]
    InsufficientData,

    /// Unconsumed bytes after a complete value.
    #[error("{0} trailing byte(s) after value")]
    TrailingBytes(usize),

    /// The reserved header byte 0xc1 (or an otherwise unusable header).
    #[error("unrecognized header byte: 0x{0:02x}")]
    InvalidHeaderByte(u8),

    /// Invalid UTF-8 byte sequence in a string.
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,

    /// A map key that is neither a string nor an integer.
    #[error("map key must be a string or an integer, got {0}")]
    InvalidMapKey(&'static str),

    /// The map key `__proto__`.
    #[error("the map key \"__proto__\" is not allowed")]
    ForbiddenKey,

    /// A declared length above its configured maximum.
    #[error("{kind} length {length} exceeds maximum {max}")]
    LengthLimitExceeded {
        kind: LengthKind,
        length: u64,
        max: usize,
    },

    /// No decoder is registered for an extension type code.
    #[error("unsupported extension type: {0}")]
    UnsupportedExtension(i8),

    /// Well-formed bytes carrying a value that cannot be accepted.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A decoded value of the wrong type for the requested target.
    #[error("invalid type: expected {expected}, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },

    /// Value nesting too deep to encode.
    #[error("maximum depth {0} exceeded")]
    MaxDepthExceeded(usize),

    /// Value that matches no wire format and no registered extension.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    /// A length that does not fit the 32-bit length fields of the format.
    #[error("length {0} does not fit a 32-bit length field")]
    LengthOverflow(usize),

    /// I/O error from a pull source.
    #[error("I/O error: {0}")]
    Io(String),

    /// Custom error message (for serde integration and extension handlers).
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Returns the broad classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InsufficientData => ErrorKind::InsufficientData,
            Error::MaxDepthExceeded(_) => ErrorKind::DepthExceeded,
            Error::UnsupportedValue(_) | Error::LengthOverflow(_) => ErrorKind::UnsupportedValue,
            Error::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Decode,
        }
    }

    /// Returns true if more input could let the operation succeed.
    #[must_use]
    pub fn is_insufficient_data(&self) -> bool {
        self.kind() == ErrorKind::InsufficientData
    }

    /// Returns a stable name for the error variant.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::InsufficientData => "insufficient_data",
            Error::TrailingBytes(_) => "trailing_bytes",
            Error::InvalidHeaderByte(_) => "invalid_header_byte",
            Error::InvalidUtf8 => "invalid_utf8",
            Error::InvalidMapKey(_) => "invalid_map_key",
            Error::ForbiddenKey => "forbidden_key",
            Error::LengthLimitExceeded { .. } => "length_limit_exceeded",
            Error::UnsupportedExtension(_) => "unsupported_extension",
            Error::InvalidData(_) => "invalid_data",
            Error::UnexpectedType { .. } => "unexpected_type",
            Error::MaxDepthExceeded(_) => "max_depth_exceeded",
            Error::UnsupportedValue(_) => "unsupported_value",
            Error::LengthOverflow(_) => "length_overflow",
            Error::Io(_) => "io_error",
            Error::Custom(_) => "custom",
        }
    }
}

impl serde::de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Custom(msg.to_string())
    }
}

impl serde::ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Custom(msg.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            return Error::InsufficientData;
        }
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::InsufficientData.kind(), ErrorKind::InsufficientData);
        assert_eq!(Error::ForbiddenKey.kind(), ErrorKind::Decode);
        assert_eq!(Error::TrailingBytes(1).kind(), ErrorKind::Decode);
        assert_eq!(Error::MaxDepthExceeded(100).kind(), ErrorKind::DepthExceeded);
        assert_eq!(Error::LengthOverflow(0).kind(), ErrorKind::UnsupportedValue);
        assert!(Error::InsufficientData.is_insufficient_data());
        assert!(!Error::InvalidUtf8.is_insufficient_data());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::InvalidHeaderByte(0xc1).to_string(),
            "unrecognized header byte: 0xc1"
        );
        let err = Error::LengthLimitExceeded {
            kind: LengthKind::Array,
            length: 10,
            max: 4,
        };
        assert_eq!(err.to_string(), "array length 10 exceeds maximum 4");
        assert_eq!(err.error_type(), "length_limit_exceeded");
    }

    #[test]
    fn test_io_eof_maps_to_insufficient_data() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert_eq!(err, Error::InsufficientData);
        let err: Error = std::io::Error::other("boom").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
