//! Low-level reader for the primitive encodings the record grammar is built from.
//!
//! ## Encodings
//!
//! - Fixed-width integers and floats are little-endian
//! - Strings carry a 7-bit encoded length prefix (at most 5 bytes, fits an `i32`)
//!   followed by that many bytes of UTF-8
//! - A `Char` is a single UTF-8 encoded scalar value (1 to 4 bytes)
//!
//! Bulk reads never allocate more than the stream actually delivers, so a
//! hostile length prefix cannot force a large allocation up front.

use crate::error::{Error, Result};
use std::io::{ErrorKind, Read};

/// Maximum number of bytes in a 7-bit encoded 32-bit length
const MAX_7BIT_LEN: usize = 5;

/// Sequential little-endian reader that tracks its byte offset for diagnostics
#[derive(Debug)]
pub struct BinaryReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> BinaryReader<R> {
    /// Wraps a byte source positioned at the start of a payload
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Number of bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the underlying byte source
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Fill `buf` completely or fail with [`Error::UnexpectedEnd`]
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(Error::UnexpectedEnd {
                offset: self.offset,
            }),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read exactly `len` bytes, growing the buffer only as data arrives
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let read = (&mut self.inner)
            .take(len as u64)
            .read_to_end(&mut buf)
            .map_err(Error::Io)?;
        self.offset += read as u64;
        if read < len {
            return Err(Error::UnexpectedEnd {
                offset: self.offset,
            });
        }
        Ok(buf)
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a signed byte
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(i8::from_le_bytes(self.read_array()?))
    }

    /// Read a boolean encoded as a single byte
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a little-endian `i16`
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `u16`
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `i32`
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `u32`
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `i64`
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `u64`
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian IEEE 754 single
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian IEEE 754 double
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Read a 7-bit encoded length prefix.
    ///
    /// Each byte contributes its low 7 bits, least significant group first,
    /// and the high bit marks continuation. The result must fit an `i32`.
    pub fn read_7bit_length(&mut self) -> Result<usize> {
        let start = self.offset;
        let mut result: u32 = 0;

        for i in 0..MAX_7BIT_LEN {
            let byte = self.read_u8()?;

            if i == MAX_7BIT_LEN - 1 && byte > 0x07 {
                // The fifth byte may only carry the top 4 bits of a u32
                return Err(Error::invalid_value(start, "7-bit encoded length overflows 32 bits"));
            }

            result |= ((byte & 0x7F) as u32) << (7 * i);

            if byte & 0x80 == 0 {
                if result > i32::MAX as u32 {
                    return Err(Error::invalid_value(
                        start,
                        format!("negative string length {}", result as i32),
                    ));
                }
                return Ok(result as usize);
            }
        }

        Err(Error::invalid_value(start, "7-bit encoded length is longer than 5 bytes"))
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_7bit_length()?;
        let start = self.offset;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| Error::TextEncodingInvalid {
            offset: start,
            source: e.utf8_error(),
        })
    }

    /// Read a single UTF-8 encoded character
    pub fn read_char(&mut self) -> Result<char> {
        let start = self.offset;
        let mut buf = [0u8; 4];
        buf[0] = self.read_u8()?;

        let width = match buf[0] {
            0x00..=0x7F => 1,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1, // invalid lead byte, rejected by from_utf8 below
        };
        self.read_exact(&mut buf[1..width])?;

        let text = std::str::from_utf8(&buf[..width]).map_err(|source| {
            Error::TextEncodingInvalid {
                offset: start,
                source,
            }
        })?;
        text.chars()
            .next()
            .ok_or_else(|| Error::invalid_value(start, "empty char payload"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(data: &[u8]) -> BinaryReader<&[u8]> {
        BinaryReader::new(data)
    }

    #[test]
    fn test_read_7bit_length_single_byte() {
        let mut r = reader(&[0x08]);
        assert_eq!(r.read_7bit_length().unwrap(), 8);
        assert_eq!(r.offset(), 1);
    }

    #[test]
    fn test_read_7bit_length_multi_byte() {
        let mut r = reader(&[0xAC, 0x02]); // 300
        assert_eq!(r.read_7bit_length().unwrap(), 300);
        assert_eq!(r.offset(), 2);
    }

    #[test]
    fn test_read_7bit_length_max() {
        let mut r = reader(&[0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
        assert_eq!(r.read_7bit_length().unwrap(), i32::MAX as usize);
    }

    #[test]
    fn test_read_7bit_length_rejects_negative_and_overlong() {
        assert!(matches!(
            reader(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]).read_7bit_length(),
            Err(Error::InvalidValue { .. })
        ));
        assert!(matches!(
            reader(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]).read_7bit_length(),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_read_string() {
        let mut r = reader(&[0x05, b'h', b'e', b'l', b'l', b'o', 0xAA]);
        assert_eq!(r.read_string().unwrap(), "hello");
        assert_eq!(r.read_u8().unwrap(), 0xAA);
    }

    #[test]
    fn test_read_string_invalid_utf8() {
        let mut r = reader(&[0x02, 0xC3, 0x28]);
        assert!(matches!(
            r.read_string(),
            Err(Error::TextEncodingInvalid { offset: 1, .. })
        ));
    }

    #[test]
    fn test_read_string_truncated_does_not_preallocate() {
        // Claims 2^31 - 1 bytes but delivers three
        let mut r = reader(&[0xFF, 0xFF, 0xFF, 0xFF, 0x07, b'a', b'b', b'c']);
        assert!(matches!(r.read_string(), Err(Error::UnexpectedEnd { offset: 8 })));
    }

    #[test]
    fn test_read_char_widths() {
        let mut r = reader("aé€😀".as_bytes());
        assert_eq!(r.read_char().unwrap(), 'a');
        assert_eq!(r.read_char().unwrap(), 'é');
        assert_eq!(r.read_char().unwrap(), '€');
        assert_eq!(r.read_char().unwrap(), '😀');
    }

    #[test]
    fn test_read_char_invalid() {
        assert!(matches!(
            reader(&[0xFF]).read_char(),
            Err(Error::TextEncodingInvalid { .. })
        ));
    }

    #[test]
    fn test_fixed_width_little_endian() {
        let mut r = reader(&[0x01, 0x00, 0x00, 0x00, 0xFE, 0xFF]);
        assert_eq!(r.read_i32().unwrap(), 1);
        assert_eq!(r.read_i16().unwrap(), -2);
        assert!(matches!(r.read_u8(), Err(Error::UnexpectedEnd { offset: 6 })));
    }
}
