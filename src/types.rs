// ABOUTME: MessagePack header-byte table and the default resource limits.
// ABOUTME: Header constants map directly to the MessagePack specification byte values.

/// Header bytes for MessagePack values.
/// These match the MessagePack specification exactly.
pub mod marker {
    // Positive fixint: 0x00-0x7f
    pub const POSFIXINT_MAX: u8 = 0x7f;

    // Fixmap (0-15 pairs): 0x80-0x8f
    pub const FIXMAP: u8 = 0x80;
    pub const FIXMAP_MAX: u8 = 0x8f;

    // Fixarray (0-15 elements): 0x90-0x9f
    pub const FIXARRAY: u8 = 0x90;
    pub const FIXARRAY_MAX: u8 = 0x9f;

    // Fixstr (0-31 bytes): 0xa0-0xbf
    pub const FIXSTR: u8 = 0xa0;
    pub const FIXSTR_MAX: u8 = 0xbf;

    pub const NIL: u8 = 0xc0;
    // Never used
    pub const RESERVED: u8 = 0xc1;
    pub const FALSE: u8 = 0xc2;
    pub const TRUE: u8 = 0xc3;

    pub const BIN8: u8 = 0xc4;
    pub const BIN16: u8 = 0xc5;
    pub const BIN32: u8 = 0xc6;

    pub const EXT8: u8 = 0xc7;
    pub const EXT16: u8 = 0xc8;
    pub const EXT32: u8 = 0xc9;

    pub const FLOAT32: u8 = 0xca;
    pub const FLOAT64: u8 = 0xcb;

    pub const UINT8: u8 = 0xcc;
    pub const UINT16: u8 = 0xcd;
    pub const UINT32: u8 = 0xce;
    pub const UINT64: u8 = 0xcf;

    pub const INT8: u8 = 0xd0;
    pub const INT16: u8 = 0xd1;
    pub const INT32: u8 = 0xd2;
    pub const INT64: u8 = 0xd3;

    pub const FIXEXT1: u8 = 0xd4;
    pub const FIXEXT2: u8 = 0xd5;
    pub const FIXEXT4: u8 = 0xd6;
    pub const FIXEXT8: u8 = 0xd7;
    pub const FIXEXT16: u8 = 0xd8;

    pub const STR8: u8 = 0xd9;
    pub const STR16: u8 = 0xda;
    pub const STR32: u8 = 0xdb;

    pub const ARRAY16: u8 = 0xdc;
    pub const ARRAY32: u8 = 0xdd;

    pub const MAP16: u8 = 0xde;
    pub const MAP32: u8 = 0xdf;

    // Negative fixint (-32 to -1): 0xe0-0xff
    pub const NEGFIXINT: u8 = 0xe0;

    /// Largest size a fixmap or fixarray header can carry inline
    pub const MAX_FIX_CONTAINER: usize = 15;

    /// Largest byte length a fixstr header can carry inline
    pub const MAX_FIXSTR: usize = 31;

    /// Check if a header byte is a positive or negative fixint
    #[inline]
    pub const fn is_fixint(code: u8) -> bool {
        code <= POSFIXINT_MAX || code >= NEGFIXINT
    }

    /// Decode a fixint header byte to its value
    #[inline]
    pub const fn fixint_value(code: u8) -> i8 {
        code as i8
    }

    /// Check if a header byte is a fixmap
    #[inline]
    pub const fn is_fixmap(code: u8) -> bool {
        code >= FIXMAP && code <= FIXMAP_MAX
    }

    /// Check if a header byte is a fixarray
    #[inline]
    pub const fn is_fixarray(code: u8) -> bool {
        code >= FIXARRAY && code <= FIXARRAY_MAX
    }

    /// Check if a header byte is a fixstr
    #[inline]
    pub const fn is_fixstr(code: u8) -> bool {
        code >= FIXSTR && code <= FIXSTR_MAX
    }

    /// Get the size carried inline by a fixmap, fixarray or fixstr header
    #[inline]
    pub const fn inline_size(code: u8) -> usize {
        if is_fixstr(code) {
            (code - FIXSTR) as usize
        } else {
            (code & 0x0f) as usize
        }
    }

    /// Check if a header byte starts any string format
    #[inline]
    pub const fn is_str(code: u8) -> bool {
        is_fixstr(code) || (code >= STR8 && code <= STR32)
    }

    /// Check if a header byte starts a value that may be used as a map key
    #[inline]
    pub const fn is_key(code: u8) -> bool {
        is_fixint(code) || is_str(code) || (code >= UINT8 && code <= INT64)
    }

    /// Payload size of a fixext header
    #[inline]
    pub const fn fixext_size(code: u8) -> usize {
        1 << (code - FIXEXT1)
    }

    /// Width in bytes of the length field following a str/bin/ext/array/map header
    #[inline]
    pub const fn length_width(code: u8) -> usize {
        match code {
            BIN8 | EXT8 | STR8 => 1,
            BIN16 | EXT16 | STR16 | ARRAY16 | MAP16 => 2,
            _ => 4,
        }
    }

    /// Width in bytes of the payload following a numeric header
    #[inline]
    pub const fn number_width(code: u8) -> usize {
        match code {
            UINT8 | INT8 => 1,
            UINT16 | INT16 => 2,
            UINT32 | INT32 | FLOAT32 => 4,
            _ => 8,
        }
    }

    /// Human readable family name of a header byte, used in error messages
    pub const fn family(code: u8) -> &'static str {
        match code {
            _ if is_fixint(code) => "integer",
            _ if is_fixmap(code) => "map",
            _ if is_fixarray(code) => "array",
            _ if is_fixstr(code) => "string",
            NIL => "nil",
            FALSE | TRUE => "boolean",
            BIN8..=BIN32 => "binary",
            EXT8..=EXT32 | FIXEXT1..=FIXEXT16 => "extension",
            FLOAT32 | FLOAT64 => "float",
            UINT8..=INT64 => "integer",
            STR8..=STR32 => "string",
            ARRAY16 | ARRAY32 => "array",
            MAP16 | MAP32 => "map",
            _ => "reserved",
        }
    }
}

/// Default resource limits and sizes.
pub mod limits {
    /// Default maximum for every declared length (string, binary, array, map, extension)
    pub const MAX_LENGTH: usize = u32::MAX as usize;

    /// Maximum value nesting depth when encoding
    pub const MAX_DEPTH: usize = 100;

    /// Initial size of the encoder output buffer and the stream decoder scratch buffer
    pub const INITIAL_BUFFER_SIZE: usize = 2048;

    /// Longest map key (in bytes) eligible for the key cache
    pub const MAX_CACHED_KEY_LENGTH: usize = 16;

    /// Cached keys kept per key length before the oldest is evicted
    pub const MAX_CACHED_KEYS_PER_LENGTH: usize = 16;
}
