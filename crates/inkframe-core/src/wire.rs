//! Little-endian byte reading and writing for the command and snapshot formats.
//!
//! Every read goes through [`ByteReader::take`], which checks
//! `offset <= total` before `len <= total - offset`, so a hostile length can
//! never wrap the bounds check.

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors raised while decoding or buffering raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("buffer truncated at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("non-finite float at offset {offset}")]
    NonFinite { offset: usize },
    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("could not reserve {requested} elements for a transient buffer")]
    OutOfMemory { requested: usize },
}

impl WireError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WireError::OutOfMemory { .. } => ErrorKind::Resource,
            _ => ErrorKind::Protocol,
        }
    }
}

/// Reserve space in a transient buffer, reporting allocation failure as an error.
pub fn try_reserve<T>(buf: &mut Vec<T>, additional: usize) -> Result<(), WireError> {
    buf.try_reserve(additional)
        .map_err(|_| WireError::OutOfMemory { requested: additional })
}

/// Cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Current read position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left after the current position.
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let total = self.bytes.len();
        if self.offset > total {
            return Err(WireError::Truncated {
                offset: self.offset,
                needed: len,
                available: 0,
            });
        }
        let available = total - self.offset;
        if len > available {
            return Err(WireError::Truncated {
                offset: self.offset,
                needed: len,
                available,
            });
        }
        let start = self.offset;
        self.offset += len;
        Ok(&self.bytes[start..start + len])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Read an `f32`, rejecting NaN and infinities.
    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        let offset = self.offset;
        let value = f32::from_le_bytes(self.array()?);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(WireError::NonFinite { offset })
        }
    }

    /// Read an `f64`, rejecting NaN and infinities.
    pub fn read_f64(&mut self) -> Result<f64, WireError> {
        let offset = self.offset;
        let value = f64::from_le_bytes(self.array()?);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(WireError::NonFinite { offset })
        }
    }

    /// Read `len` bytes as UTF-8.
    pub fn read_str(&mut self, len: usize) -> Result<&'a str, WireError> {
        let offset = self.offset;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8 { offset })
    }
}

/// Growable little-endian output buffer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Overwrite a previously written `u32` (used for counts known only later).
    pub fn patch_u32(&mut self, at: usize, value: u32) {
        if let Some(slot) = self.buf.get_mut(at..at + 4) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian_fields() {
        let mut w = ByteWriter::new();
        w.put_u32(0xDEADBEEF);
        w.put_f32(1.5);
        w.put_f64(-2.25);
        w.put_u8(7);
        let bytes = w.into_inner();

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), 0xDEADBEEF);
        assert!((r.read_f32().unwrap() - 1.5).abs() < f32::EPSILON);
        assert!((r.read_f64().unwrap() + 2.25).abs() < f64::EPSILON);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert!(r.is_empty());
    }

    #[test]
    fn test_take_rejects_oversized_length_without_wrapping() {
        let bytes = [0u8; 8];
        let mut r = ByteReader::new(&bytes);
        r.take(4).unwrap();
        let err = r.take(usize::MAX).unwrap_err();
        assert_eq!(
            err,
            WireError::Truncated {
                offset: 4,
                needed: usize::MAX,
                available: 4
            }
        );
        // A failed read does not advance.
        assert_eq!(r.offset(), 4);
    }

    #[test]
    fn test_rejects_nan() {
        let bytes = f32::NAN.to_le_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_f32(), Err(WireError::NonFinite { offset: 0 }));
    }

    #[test]
    fn test_invalid_utf8() {
        let bytes = [0xFF, 0xFE];
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_str(2), Err(WireError::InvalidUtf8 { offset: 0 }));
    }

    #[test]
    fn test_patch_u32() {
        let mut w = ByteWriter::new();
        w.put_u32(0);
        w.put_u32(5);
        w.patch_u32(0, 42);
        let mut r = ByteReader::new(w.as_slice());
        assert_eq!(r.read_u32().unwrap(), 42);
        assert_eq!(r.read_u32().unwrap(), 5);
    }
}
