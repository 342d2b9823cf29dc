#![forbid(unsafe_code)]
//! Varints, length-prefixed fields and a checked cursor shared by the
//! marker codec and changeset hashing.

use crate::types::{EvolveError, Result};

pub mod lp {
    //! Length-prefixed fields with big-endian `u32` lengths.

    /// Appends a length-prefixed byte string.
    pub fn put_bytes(dst: &mut Vec<u8>, bytes: &[u8]) {
        let len = bytes.len();
        assert!(
            len <= u32::MAX as usize,
            "field too long (>{} bytes)",
            u32::MAX
        );
        dst.extend_from_slice(&(len as u32).to_be_bytes());
        dst.extend_from_slice(bytes);
    }

    /// Appends a length-prefixed UTF-8 string.
    pub fn put_str(dst: &mut Vec<u8>, s: &str) {
        put_bytes(dst, s.as_bytes());
    }
}

pub mod var {
    //! Unsigned varints and ZigZag signed integers.

    use super::{EvolveError, Result};

    /// Encodes a u64 as an unsigned varint.
    pub fn encode_u64(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            } else {
                out.push(byte | 0x80);
            }
        }
    }

    /// Decodes a u64 varint from a slice, updating the offset.
    pub fn decode_u64(src: &[u8], off: &mut usize) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        for i in 0..10 {
            let Some(&byte) = src.get(*off) else {
                return Err(EvolveError::Corruption(format!(
                    "varint decode truncated at byte {i}"
                )));
            };
            *off += 1;
            let payload = (byte & 0x7f) as u64;
            if i == 9 && payload > 1 {
                return Err(EvolveError::Corruption(
                    "varint overflow (more than 64 bits)".into(),
                ));
            }
            result |= payload << shift;
            if (byte & 0x80) == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(EvolveError::Corruption(
            "varint too long (exceeded 10 bytes)".into(),
        ))
    }

    /// Encodes an i64 as a ZigZag-encoded varint.
    pub fn encode_i64(v: i64, out: &mut Vec<u8>) {
        let zigzag = ((v << 1) ^ (v >> 63)) as u64;
        encode_u64(zigzag, out);
    }

    /// Decodes a ZigZag-encoded i64 varint from a slice, updating the offset.
    pub fn decode_i64(src: &[u8], off: &mut usize) -> Result<i64> {
        let zigzag = decode_u64(src, off)?;
        Ok(((zigzag >> 1) as i64) ^ (-((zigzag & 1) as i64)))
    }
}

pub mod buf {
    //! A slice-backed cursor whose reads fail instead of panicking.

    use core::fmt;

    use super::{var, EvolveError, Result};

    /// A cursor for reading bytes from a slice with offset tracking.
    pub struct Cursor<'a> {
        /// The underlying byte slice.
        pub buf: &'a [u8],
        /// Current read offset.
        pub off: usize,
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes from the cursor, advancing the offset.
        pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
            let end = self
                .off
                .checked_add(n)
                .ok_or_else(|| EvolveError::Corruption("cursor offset overflow".into()))?;
            if end > self.buf.len() {
                return Err(EvolveError::Corruption(format!(
                    "cursor take beyond buffer: need {}, remaining {}",
                    n,
                    self.remaining()
                )));
            }
            let slice = &self.buf[self.off..end];
            self.off = end;
            Ok(slice)
        }

        /// Reads one byte.
        pub fn u8(&mut self) -> Result<u8> {
            Ok(self.take(1)?[0])
        }

        /// Reads a big-endian u32.
        pub fn u32_be(&mut self) -> Result<u32> {
            let raw = self.take(4)?;
            Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
        }

        /// Reads an unsigned varint.
        pub fn var_u64(&mut self) -> Result<u64> {
            var::decode_u64(self.buf, &mut self.off)
        }

        /// Reads a ZigZag varint.
        pub fn var_i64(&mut self) -> Result<i64> {
            var::decode_i64(self.buf, &mut self.off)
        }

        /// Returns the number of bytes remaining in the buffer.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }

        /// Whether every byte has been consumed.
        pub fn is_empty(&self) -> bool {
            self.remaining() == 0
        }
    }

    impl<'a> fmt::Debug for Cursor<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }
}
