//! Cursor over a module image
//!
//! Wraps the raw buffer with the primitive reads the module format is built
//! from: fixed-width little-endian scalars and the variable-length signed
//! index encoding. Every read is bounds checked; running off the end of the
//! buffer is always fatal.

use tracing::warn;

use super::error::{DecodeError, DecodeErrorKind, DecodeResult};

/// Multi-byte flag of the first index byte
const INDEX_MULTI: u8 = 0x80;
/// Four-byte form flag (only meaningful with `INDEX_MULTI`)
const INDEX_WIDE: u8 = 0x40;
/// Sign flag of the multi-byte forms
const INDEX_NEG: u8 = 0x20;
/// Magnitude bits carried by the first byte of a multi-byte form
const INDEX_HIGH_MASK: u8 = 0x1F;

/// A non-fatal problem found while decoding
///
/// The decoder substitutes a default and keeps going; diagnostics are kept on
/// the module so callers can inspect what was patched.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub offset: usize,
    pub message: String,
}

/// Byte cursor with lenient-diagnostic collection
#[derive(Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Current byte offset
    #[inline]
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn error(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError::new(self.pos, kind)
    }

    /// Record a lenient data error and log it
    pub fn diagnose(&mut self, offset: usize, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "hlbridge::decode", offset, %message, "Substituting default for bad data");
        self.diagnostics.push(Diagnostic { offset, message });
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Borrow the next `len` bytes and advance past them
    pub fn read_bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.error(DecodeErrorKind::UnexpectedEof {
                wanted: len,
                available: self.remaining(),
            }));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    #[inline]
    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i32(&mut self) -> DecodeResult<i32> {
        let b = self.read_bytes(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f64(&mut self) -> DecodeResult<f64> {
        let b = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_le_bytes(raw))
    }

    /// Read a signed variable-length index
    ///
    /// Layout of the first byte: bit 7 selects a multi-byte form, bit 6 the
    /// four-byte form, bit 5 is the sign, the low 5 bits are the high part of
    /// the magnitude. A single-byte index is always non-negative (0..=127).
    pub fn read_index(&mut self) -> DecodeResult<i32> {
        let b = self.read_u8()?;
        if b & INDEX_MULTI == 0 {
            return Ok((b & 0x7F) as i32);
        }
        let magnitude = if b & INDEX_WIDE == 0 {
            let c = self.read_u8()? as i32;
            (((b & INDEX_HIGH_MASK) as i32) << 8) | c
        } else {
            let rest = self.read_bytes(3)?;
            (((b & INDEX_HIGH_MASK) as i32) << 24)
                | ((rest[0] as i32) << 16)
                | ((rest[1] as i32) << 8)
                | rest[2] as i32
        };
        Ok(if b & INDEX_NEG != 0 { -magnitude } else { magnitude })
    }

    /// Read an index that must not be negative
    ///
    /// A negative value is a lenient data error: it is replaced by 0 and a
    /// diagnostic is recorded instead of failing the decode.
    pub fn read_uindex(&mut self) -> DecodeResult<usize> {
        let at = self.pos;
        let value = self.read_index()?;
        if value < 0 {
            self.diagnose(at, format!("negative value {} where an unsigned index was expected", value));
            return Ok(0);
        }
        Ok(value as usize)
    }

    /// Read a uindex used as an element count
    ///
    /// Counts drive allocations, so anything larger than the bytes left in the
    /// buffer is rejected up front rather than trusted.
    pub fn read_count(&mut self) -> DecodeResult<usize> {
        let count = self.read_uindex()?;
        if count > self.remaining() {
            return Err(self.error(DecodeErrorKind::InvalidCount(count as i64)));
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::writer::ByteWriter;

    #[test]
    fn test_single_byte_index() {
        let mut r = ByteReader::new(&[0x00, 0x2A, 0x7F]);
        assert_eq!(r.read_index().unwrap(), 0);
        assert_eq!(r.read_index().unwrap(), 42);
        assert_eq!(r.read_index().unwrap(), 127);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_two_byte_index() {
        // 0x80 | 0x01 high, 0x00 low = 256
        let mut r = ByteReader::new(&[0x81, 0x00, 0xA0, 0x05]);
        assert_eq!(r.read_index().unwrap(), 256);
        // sign flag set, magnitude 5
        assert_eq!(r.read_index().unwrap(), -5);
    }

    #[test]
    fn test_four_byte_index() {
        let mut r = ByteReader::new(&[0xC1, 0x02, 0x03, 0x04]);
        assert_eq!(r.read_index().unwrap(), (1 << 24) | (2 << 16) | (3 << 8) | 4);
    }

    #[test]
    fn test_index_roundtrip_boundaries() {
        let values = [
            0,
            1,
            127,
            128,
            -1,
            -127,
            -128,
            0x1FFF,
            -0x1FFF,
            0x2000,
            -0x2000,
            (1 << 28) - 1,
            -(1 << 28),
            123_456_789,
            -98_765_432,
        ];
        for v in values {
            let mut w = ByteWriter::new();
            w.write_index(v).unwrap();
            let bytes = w.into_bytes();
            let mut r = ByteReader::new(&bytes);
            assert_eq!(r.read_index().unwrap(), v, "roundtrip failed for {}", v);
            assert_eq!(r.remaining(), 0, "trailing bytes for {}", v);
        }
    }

    #[test]
    fn test_index_roundtrip_sweep() {
        // Stride through the whole documented range, both signs
        let mut v: i64 = -(1 << 28);
        while v < (1 << 28) {
            let mut w = ByteWriter::new();
            w.write_index(v as i32).unwrap();
            let bytes = w.into_bytes();
            let mut r = ByteReader::new(&bytes);
            assert_eq!(r.read_index().unwrap() as i64, v);
            v += 65_521;
        }
    }

    #[test]
    fn test_uindex_negative_is_lenient() {
        let mut r = ByteReader::new(&[0xA0, 0x03, 0x07]);
        assert_eq!(r.read_uindex().unwrap(), 0);
        assert_eq!(r.read_uindex().unwrap(), 7);
        let diags = r.take_diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].offset, 0);
    }

    #[test]
    fn test_underrun_is_fatal() {
        let mut r = ByteReader::new(&[0xC0, 0x01]);
        let err = r.read_index().unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::UnexpectedEof { wanted: 3, available: 1 }));
    }

    #[test]
    fn test_fixed_width_scalars() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-7i32).to_le_bytes());
        bytes.extend_from_slice(&2.5f64.to_le_bytes());
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_i32().unwrap(), -7);
        assert_eq!(r.read_f64().unwrap(), 2.5);
        assert!(r.read_u8().is_err());
    }
}
