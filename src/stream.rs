// ABOUTME: Incremental MessagePack decoder fed from chunked or pull-style sources.
// ABOUTME: Suspends exactly where more bytes are needed and resumes without reparsing finished structure.

use crate::decoder::{DecoderConfig, Input, StateMachine};
use crate::error::{Error, Result};
use crate::value::Value;
use std::io::{ErrorKind, Read};
use std::iter::FusedIterator;

/// An incremental MessagePack decoder.
///
/// Bytes are pushed in with [`StreamDecoder::feed`] and values pulled out with
/// [`StreamDecoder::next_value`], which returns `Ok(None)` until a whole value
/// has arrived. The blocking and async helpers are built on that pair.
///
/// The scratch buffer grows geometrically and is never shrunk. After a
/// decode error the decoder discards its buffered input and partial state.
pub struct StreamDecoder {
    machine: StateMachine,
    buf: Vec<u8>,
    /// Offset of the first unconsumed byte in `buf`
    start: usize,
    /// Unconsumed bytes required before parsing is worth retrying
    needed: usize,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    #[must_use]
    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            buf: Vec::with_capacity(config.initial_buffer_size.max(1)),
            machine: StateMachine::new(config),
            start: 0,
            needed: 1,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DecoderConfig {
        self.machine.config()
    }

    /// Number of bytes received but not yet consumed.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Current capacity of the scratch buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// True when no value is partially decoded and no bytes are waiting.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.machine.is_idle() && self.buffered() == 0
    }

    /// Append a chunk of input.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.compact();
        self.reserve(chunk.len());
        self.buf.extend_from_slice(chunk);
    }

    /// Decode the next value from the bytes fed so far.
    ///
    /// Returns `Ok(None)` when more input is needed.
    pub fn next_value(&mut self) -> Result<Option<Value>> {
        if self.buffered() < self.needed {
            return Ok(None);
        }

        let mut input = Input::new(&self.buf[self.start..]);
        let result = self.machine.run(&mut input);
        self.start += input.position();

        match result {
            Ok(value) => {
                self.needed = 1;
                Ok(Some(value))
            }
            Err(Error::InsufficientData) => {
                self.needed = input.wanted();
                Ok(None)
            }
            Err(err) => {
                self.reset();
                Err(err)
            }
        }
    }

    /// Drop all buffered input and any partially decoded value.
    /// The scratch buffer keeps its capacity.
    pub fn reset(&mut self) {
        self.machine.reset();
        self.buf.clear();
        self.start = 0;
        self.needed = 1;
    }

    /// Decode exactly one value from `reader`, which must then be at end of input.
    pub fn decode_from<R: Read>(&mut self, mut reader: R) -> Result<Value> {
        let value = loop {
            if let Some(value) = self.next_value()? {
                break value;
            }
            if self.pull(&mut reader)? == 0 {
                self.reset();
                return Err(Error::InsufficientData);
            }
        };

        self.expect_end(&mut reader)?;
        Ok(value)
    }

    /// Fail with `TrailingBytes` unless both the buffer and `reader` are exhausted.
    fn expect_end<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        let trailing = match self.buffered() {
            0 => self.pull(reader)?,
            n => n,
        };
        if trailing > 0 {
            self.reset();
            return Err(Error::TrailingBytes(trailing));
        }
        Ok(())
    }

    /// Lazily decode successive top-level values from `reader`.
    pub fn values<R: Read>(self, reader: R) -> StreamValues<R> {
        StreamValues {
            decoder: self,
            reader,
            done: false,
        }
    }

    /// Lazily decode the elements of one top-level array from `reader`.
    ///
    /// Elements are yielded as they complete, so the whole array never needs
    /// to be held in memory. Once the last element is out, any further input
    /// is reported as `TrailingBytes`.
    pub fn array_items<R: Read>(self, reader: R) -> ArrayItems<R> {
        ArrayItems {
            decoder: self,
            reader,
            remaining: None,
            done: false,
        }
    }

    /// Decode exactly one value from an async `reader`, which must then be at end of input.
    #[cfg(feature = "async")]
    pub async fn decode_async<R>(&mut self, mut reader: R) -> Result<Value>
    where
        R: futures::io::AsyncRead + Unpin,
    {
        let value = loop {
            if let Some(value) = self.next_value()? {
                break value;
            }
            if self.pull_async(&mut reader).await? == 0 {
                self.reset();
                return Err(Error::InsufficientData);
            }
        };

        let trailing = match self.buffered() {
            0 => self.pull_async(&mut reader).await?,
            n => n,
        };
        if trailing > 0 {
            self.reset();
            return Err(Error::TrailingBytes(trailing));
        }
        Ok(value)
    }

    #[cfg(feature = "async")]
    async fn pull_async<R>(&mut self, reader: &mut R) -> Result<usize>
    where
        R: futures::io::AsyncRead + Unpin,
    {
        use futures::io::AsyncReadExt;

        let len = self.prepare_pull();
        let n = loop {
            match reader.read(&mut self.buf[len..]).await {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.finish_pull(len, 0);
                    self.reset();
                    return Err(err.into());
                }
            }
        };
        self.finish_pull(len, n);
        Ok(n)
    }

    /// Read once from `reader` into the scratch buffer. Returns 0 at end of input.
    fn pull<R: Read>(&mut self, reader: &mut R) -> Result<usize> {
        let len = self.prepare_pull();
        let n = loop {
            match reader.read(&mut self.buf[len..]) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.finish_pull(len, 0);
                    self.reset();
                    return Err(err.into());
                }
            }
        };
        self.finish_pull(len, n);
        Ok(n)
    }

    /// Expose a read window past the buffered bytes. Returns the previous length.
    ///
    /// The window tracks what has actually arrived rather than the declared
    /// length still missing, so a large length prefix alone cannot force a
    /// large allocation.
    fn prepare_pull(&mut self) -> usize {
        self.compact();
        let window = self
            .buffered()
            .max(self.machine.config().initial_buffer_size)
            .max(1);
        self.reserve(window);
        let len = self.buf.len();
        self.buf.resize(len + window, 0);
        len
    }

    fn finish_pull(&mut self, len: usize, n: usize) {
        self.buf.truncate(len + n);
        tracing::trace!(bytes = n, buffered = self.buffered(), "pulled from source");
    }

    /// Move unconsumed bytes to the front of the scratch buffer.
    fn compact(&mut self) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
    }

    /// Grow the scratch buffer so that `additional` more bytes fit.
    fn reserve(&mut self, additional: usize) {
        let needed = self.buf.len() + additional;
        let capacity = self.buf.capacity();
        if needed > capacity {
            let target = needed.max(capacity * 2);
            self.buf.reserve_exact(target - self.buf.len());
            tracing::trace!(from = capacity, to = target, "growing scratch buffer");
        }
    }

    /// Decode the top-level array header, once enough bytes are buffered.
    fn next_array_header(&mut self) -> Result<Option<usize>> {
        if self.buffered() < self.needed {
            return Ok(None);
        }

        let mut input = Input::new(&self.buf[self.start..]);
        match self.machine.read_array_header(&mut input) {
            Ok(len) => {
                self.start += input.position();
                self.needed = 1;
                Ok(Some(len))
            }
            Err(Error::InsufficientData) => {
                self.needed = input.wanted();
                Ok(None)
            }
            Err(err) => {
                self.reset();
                Err(err)
            }
        }
    }
}

/// Iterator over successive top-level values read from a source.
///
/// Ends cleanly when the source is exhausted between values. Ending inside a
/// value yields `InsufficientData` once; any error ends the iteration.
pub struct StreamValues<R> {
    decoder: StreamDecoder,
    reader: R,
    done: bool,
}

impl<R: Read> Iterator for StreamValues<R> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.decoder.next_value() {
                Ok(Some(value)) => return Some(Ok(value)),
                Ok(None) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
            match self.decoder.pull(&mut self.reader) {
                Ok(0) => {
                    self.done = true;
                    if self.decoder.is_idle() {
                        return None;
                    }
                    self.decoder.reset();
                    return Some(Err(Error::InsufficientData));
                }
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<R: Read> FusedIterator for StreamValues<R> {}

/// Iterator over the elements of one top-level array read from a source.
pub struct ArrayItems<R> {
    decoder: StreamDecoder,
    reader: R,
    /// Elements left, once the array header has been read
    remaining: Option<usize>,
    done: bool,
}

impl<R: Read> ArrayItems<R> {
    fn step(&mut self) -> Result<Option<Value>> {
        loop {
            let ready = match self.remaining {
                None => match self.decoder.next_array_header()? {
                    Some(len) => {
                        self.remaining = Some(len);
                        continue;
                    }
                    None => None,
                },
                Some(0) => {
                    self.decoder.expect_end(&mut self.reader)?;
                    return Ok(None);
                }
                Some(n) => match self.decoder.next_value()? {
                    Some(value) => {
                        self.remaining = Some(n - 1);
                        Some(value)
                    }
                    None => None,
                },
            };
            if let Some(value) = ready {
                return Ok(Some(value));
            }
            if self.decoder.pull(&mut self.reader)? == 0 {
                self.decoder.reset();
                return Err(Error::InsufficientData);
            }
        }
    }
}

impl<R: Read> Iterator for ArrayItems<R> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<R: Read> FusedIterator for ArrayItems<R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgpack;
    use crate::types::limits;

    /// A reader that hands out at most `chunk` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_feed_one_byte_at_a_time() {
        let data = [0x81, 0xa1, 0x61, 0x01];
        let mut decoder = StreamDecoder::new();
        for (i, byte) in data.iter().enumerate() {
            decoder.feed(&[*byte]);
            let result = decoder.next_value().unwrap();
            if i + 1 < data.len() {
                assert_eq!(result, None);
            } else {
                assert_eq!(result, Some(msgpack!({"a": 1})));
            }
        }
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_skips_reparse_until_enough_bytes() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(&[0xd9, 0x05, 0x68]);
        assert_eq!(decoder.next_value().unwrap(), None);
        assert_eq!(decoder.needed, 6);
        decoder.feed(&[0x65, 0x6c]);
        assert_eq!(decoder.next_value().unwrap(), None);
        decoder.feed(&[0x6c, 0x6f]);
        assert_eq!(decoder.next_value().unwrap(), Some(Value::from("hello")));
    }

    #[test]
    fn test_multiple_values_in_one_chunk() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(&[0x01, 0x02, 0x93]);
        assert_eq!(decoder.next_value().unwrap(), Some(Value::Int(1)));
        assert_eq!(decoder.next_value().unwrap(), Some(Value::Int(2)));
        assert_eq!(decoder.next_value().unwrap(), None);
        assert!(!decoder.is_idle());
        decoder.feed(&[0x01, 0x02, 0x03]);
        assert_eq!(decoder.next_value().unwrap(), Some(msgpack!([1, 2, 3])));
        assert_eq!(decoder.next_value().unwrap(), None);
    }

    #[test]
    fn test_error_resets() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(&[0x91, 0xc1, 0x05]);
        assert_eq!(decoder.next_value(), Err(Error::InvalidHeaderByte(0xc1)));
        assert!(decoder.is_idle());
        decoder.feed(&[0x07]);
        assert_eq!(decoder.next_value().unwrap(), Some(Value::Int(7)));
    }

    #[test]
    fn test_scratch_grows_and_keeps_capacity() {
        let config = DecoderConfig {
            initial_buffer_size: 4,
            ..Default::default()
        };
        let mut decoder = StreamDecoder::with_config(config);
        let mut data = vec![0xc4, 64];
        data.extend_from_slice(&[0xab; 64]);
        decoder.feed(&data);
        let grown = decoder.capacity();
        assert!(grown >= data.len());
        assert_eq!(decoder.next_value().unwrap(), Some(Value::Binary(vec![0xab; 64])));
        decoder.feed(&[0xc0]);
        assert_eq!(decoder.capacity(), grown);
    }

    #[test]
    fn test_declared_length_does_not_size_the_buffer() {
        // bin 32 announcing 256 MiB with no payload behind it
        let header = [0xc6, 0x10, 0x00, 0x00, 0x00];
        let reader = Trickle {
            data: &header,
            chunk: 1,
        };
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.decode_from(reader), Err(Error::InsufficientData));
        assert!(decoder.capacity() <= 4 * limits::INITIAL_BUFFER_SIZE);
    }

    #[test]
    fn test_decode_from_reader() {
        let data = [0x92, 0xa2, 0x68, 0x69, 0xcd, 0x01, 0x00];
        for chunk in 1..=data.len() {
            let reader = Trickle { data: &data, chunk };
            let value = StreamDecoder::new().decode_from(reader).unwrap();
            assert_eq!(value, msgpack!(["hi", 256]));
        }
    }

    #[test]
    fn test_decode_from_truncated_and_trailing() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(
            decoder.decode_from(&[0x92, 0x01][..]),
            Err(Error::InsufficientData)
        );
        assert_eq!(
            decoder.decode_from(std::io::empty()),
            Err(Error::InsufficientData)
        );

        let reader = Trickle {
            data: &[0x01, 0x02, 0x03],
            chunk: 1,
        };
        assert_eq!(decoder.decode_from(reader), Err(Error::TrailingBytes(1)));
        assert_eq!(
            decoder.decode_from(&[0x01, 0x02, 0x03][..]),
            Err(Error::TrailingBytes(2))
        );
        assert_eq!(decoder.decode_from(&[0xc3][..]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_values_iterator() {
        let data = [0x01, 0xa1, 0x62, 0x90, 0xc0];
        let reader = Trickle { data: &data, chunk: 2 };
        let values: Vec<_> = StreamDecoder::new()
            .values(reader)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            values,
            vec![Value::Int(1), Value::from("b"), msgpack!([]), Value::Nil]
        );

        let mut iter = StreamDecoder::new().values(&[0x01, 0x92, 0x01][..]);
        assert_eq!(iter.next(), Some(Ok(Value::Int(1))));
        assert_eq!(iter.next(), Some(Err(Error::InsufficientData)));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_array_items() {
        let data = [0xdc, 0x00, 0x03, 0x01, 0x91, 0x02, 0xa1, 0x63];
        let reader = Trickle { data: &data, chunk: 1 };
        let items: Vec<_> = StreamDecoder::new()
            .array_items(reader)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(items, vec![Value::Int(1), msgpack!([2]), Value::from("c")]);

        let mut iter = StreamDecoder::new().array_items(&[0x90][..]);
        assert_eq!(iter.next(), None);

        let mut iter = StreamDecoder::new().array_items(&[0x91, 0x01, 0x02, 0x03][..]);
        assert_eq!(iter.next(), Some(Ok(Value::Int(1))));
        assert_eq!(iter.next(), Some(Err(Error::TrailingBytes(2))));
        assert_eq!(iter.next(), None);

        let reader = Trickle {
            data: &[0x90, 0xc0],
            chunk: 1,
        };
        let mut iter = StreamDecoder::new().array_items(reader);
        assert_eq!(iter.next(), Some(Err(Error::TrailingBytes(1))));

        let mut iter = StreamDecoder::new().array_items(&[0x81, 0x01, 0x02][..]);
        assert_eq!(
            iter.next(),
            Some(Err(Error::UnexpectedType {
                expected: "array",
                found: "map"
            }))
        );
        assert_eq!(iter.next(), None);
    }

    #[cfg(feature = "async")]
    #[test]
    fn test_decode_async() {
        let data = vec![0x81, 0xa1, 0x61, 0x01];
        let reader = futures::io::Cursor::new(data);
        let value = futures::executor::block_on(StreamDecoder::new().decode_async(reader));
        assert_eq!(value.unwrap(), msgpack!({"a": 1}));

        let reader = futures::io::Cursor::new(vec![0x92, 0x01]);
        let value = futures::executor::block_on(StreamDecoder::new().decode_async(reader));
        assert_eq!(value, Err(Error::InsufficientData));
    }
}
