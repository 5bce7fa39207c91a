//! Intrinsic field encodings shared by every concrete packet body:
//! big-endian fixed-width integers, length-prefixed strings/buffers, and
//! the smallest-width selection rule for unsigned/signed integer fields.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::DecodeError;

/// Default `MaxValue` for an unsigned field with no explicit attribute.
pub const DEFAULT_UINT_MAX: u64 = u32::MAX as u64;

/// Smallest width in `{1, 2, 4, 8}` bytes whose unsigned range exceeds
/// `max_value`: `2^(8w) > max_value`.
pub fn uint_width_for_max(max_value: u64) -> u8 {
    for w in [1u8, 2, 4, 8] {
        let limit = if w == 8 { u64::MAX } else { (1u64 << (w * 8)) - 1 };
        if max_value <= limit {
            return w;
        }
    }
    8
}

/// Smallest width in `{1, 2, 4, 8}` bytes whose signed range covers
/// `[min_value, max_value]`.
pub fn int_width_for_range(min_value: i64, max_value: i64) -> u8 {
    for w in [1u8, 2, 4, 8] {
        let (lo, hi) = if w == 8 {
            (i64::MIN, i64::MAX)
        } else {
            let bits = (w as u32) * 8;
            (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
        };
        if min_value >= lo && max_value <= hi {
            return w;
        }
    }
    8
}

/// A cursor over an in-memory frame body. Every read either succeeds and
/// advances the cursor, or returns [`DecodeError::Incomplete`] and leaves
/// the cursor untouched so the caller can retry once more bytes arrive.
pub struct BodyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BodyReader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Incomplete);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Read an unsigned integer encoded at `width` bytes (one of 1/2/4/8).
    pub fn uint(&mut self, width: u8) -> Result<u64, DecodeError> {
        match width {
            1 => Ok(self.u8()? as u64),
            2 => Ok(self.u16()? as u64),
            4 => Ok(self.u32()? as u64),
            8 => self.u64(),
            other => Err(DecodeError::Other(format!("unsupported uint width {other}"))),
        }
    }

    /// Read a signed integer encoded at `width` bytes (one of 1/2/4/8),
    /// two's-complement big-endian.
    pub fn int(&mut self, width: u8) -> Result<i64, DecodeError> {
        match width {
            1 => Ok(self.take(1)?[0] as i8 as i64),
            2 => Ok(i16::from_be_bytes(self.take(2)?.try_into().unwrap()) as i64),
            4 => Ok(i32::from_be_bytes(self.take(4)?.try_into().unwrap()) as i64),
            8 => Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap())),
            other => Err(DecodeError::Other(format!("unsupported int width {other}"))),
        }
    }

    pub fn bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.u8()? != 0)
    }

    /// A string: u16 length prefix, UTF-8 bytes.
    pub fn string(&mut self) -> Result<String, DecodeError> {
        let len = self.u16()? as usize;
        self.take_string(len)
    }

    /// `len` raw bytes, decoded as UTF-8, with no length prefix of its own —
    /// used where the length was already read separately (the frame
    /// header's identifier/version strings are prefixed by a single byte
    /// rather than the u16 used for ordinary string fields).
    pub fn take_string(&mut self, len: usize) -> Result<String, DecodeError> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// A byte buffer: u64 length prefix, raw bytes.
    pub fn bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.u64()?;
        // Guard against absurd lengths before trying to allocate/read.
        if len > 64 * 1024 * 1024 {
            return Err(DecodeError::BufferTooLarge(len));
        }
        let bytes = self.take(len as usize)?;
        Ok(bytes.to_vec())
    }
}

/// An append-only writer for a frame body.
pub struct BodyWriter {
    buf: BytesMut,
}

impl BodyWriter {
    pub fn new() -> Self {
        BodyWriter { buf: BytesMut::new() }
    }

    pub fn into_bytes(self) -> BytesMut {
        self.buf
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    pub fn uint(&mut self, value: u64, width: u8) {
        match width {
            1 => self.u8(value as u8),
            2 => self.u16(value as u16),
            4 => self.u32(value as u32),
            8 => self.u64(value),
            other => panic!("unsupported uint width {other}"),
        }
    }

    pub fn int(&mut self, value: i64, width: u8) {
        match width {
            1 => self.u8(value as i8 as u8),
            2 => self.u16(value as i16 as u16),
            4 => self.u32(value as i32 as u32),
            8 => self.u64(value as u64),
            other => panic!("unsupported int width {other}"),
        }
    }

    pub fn bool(&mut self, v: bool) {
        self.u8(v as u8);
    }

    pub fn string(&mut self, s: &str) -> Result<(), crate::error::EncodeError> {
        if s.len() > u16::MAX as usize {
            return Err(crate::error::EncodeError::StringTooLong {
                len: s.len(),
                max: u16::MAX as usize,
            });
        }
        self.u16(s.len() as u16);
        self.buf.put_slice(s.as_bytes());
        Ok(())
    }

    pub fn bytes(&mut self, b: &[u8]) {
        self.u64(b.len() as u64);
        self.buf.put_slice(b);
    }

    /// Raw bytes with no length prefix of their own — pairs with
    /// [`BodyReader::take_string`] for the frame header.
    pub fn string_raw(&mut self, s: &str) {
        self.buf.put_slice(s.as_bytes());
    }

    pub fn extend_from(&mut self, other: BytesMut) {
        self.buf.put(other);
    }
}

impl Default for BodyWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_selection_matches_smallest_fit() {
        assert_eq!(uint_width_for_max(0), 1);
        assert_eq!(uint_width_for_max(255), 1);
        assert_eq!(uint_width_for_max(256), 2);
        assert_eq!(uint_width_for_max(65535), 2);
        assert_eq!(uint_width_for_max(65536), 4);
        assert_eq!(uint_width_for_max(u32::MAX as u64), 4);
        assert_eq!(uint_width_for_max(u32::MAX as u64 + 1), 8);
    }

    #[test]
    fn bits_attribute_implies_max_value() {
        // Bits=16 implies MaxValue = 2^16 - 1, i.e. a 2-byte field.
        assert_eq!(uint_width_for_max((1u64 << 16) - 1), 2);
    }

    #[test]
    fn round_trips_all_intrinsics() {
        let mut w = BodyWriter::new();
        w.u8(7);
        w.u16(1000);
        w.uint(70000, 4);
        w.int(-5, 2);
        w.bool(true);
        w.string("hello").unwrap();
        w.bytes(b"raw-data");
        let buf = w.into_bytes();

        let mut r = BodyReader::new(&buf);
        assert_eq!(r.u8().unwrap(), 7);
        assert_eq!(r.u16().unwrap(), 1000);
        assert_eq!(r.uint(4).unwrap(), 70000);
        assert_eq!(r.int(2).unwrap(), -5);
        assert!(r.bool().unwrap());
        assert_eq!(r.string().unwrap(), "hello");
        assert_eq!(r.bytes().unwrap(), b"raw-data");
    }

    #[test]
    fn incomplete_on_short_buffer() {
        let mut r = BodyReader::new(&[0u8, 1]);
        assert!(matches!(r.u32(), Err(DecodeError::Incomplete)));
    }
}
