//! Bounds-checked reader over raw file bytes.
//!
//! Every read checks `offset + width <= len` before touching memory and
//! fails with [`Error::OutOfBounds`] otherwise. Byte order is chosen per call
//! because a fat wrapper is big-endian while the slices inside it may be
//! either.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, Result};

// =============================================================================
// Byte Order
// =============================================================================

/// Byte order of a Mach-O slice or structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

impl Endian {
    /// Decodes a u16 from the first two bytes of `buf`.
    #[inline(always)]
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    /// Decodes a u32 from the first four bytes of `buf`.
    #[inline(always)]
    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }

    /// Decodes a u64 from the first eight bytes of `buf`.
    #[inline(always)]
    pub fn read_u64(self, buf: &[u8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_u64(buf),
            Endian::Big => BigEndian::read_u64(buf),
        }
    }

    /// Returns the display name.
    pub fn name(self) -> &'static str {
        match self {
            Endian::Little => "little-endian",
            Endian::Big => "big-endian",
        }
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// A forward reader over a byte slice.
///
/// After a failed read the position is unspecified; callers abandon the
/// region they were decoding.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Creates a cursor positioned at `offset`.
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self> {
        let mut cursor = Self::new(data);
        cursor.seek(offset)?;
        Ok(cursor)
    }

    /// Returns the current offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the length of the underlying buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the number of bytes left after the current position.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Moves to an absolute offset. Seeking to exactly the end is allowed.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(Error::out_of_bounds(offset, 0, self.data.len()));
        }
        self.pos = offset;
        Ok(())
    }

    /// Advances by `n` bytes without reading them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    #[inline]
    fn take(&mut self, width: usize) -> Result<&'a [u8]> {
        let start = self.pos;
        let end = start
            .checked_add(width)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::out_of_bounds(start, width, self.data.len()))?;
        self.pos = end;
        Ok(&self.data[start..end])
    }

    /// Reads one byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a u16 in the given byte order.
    #[inline]
    pub fn read_u16(&mut self, endian: Endian) -> Result<u16> {
        Ok(endian.read_u16(self.take(2)?))
    }

    /// Reads a u32 in the given byte order.
    #[inline]
    pub fn read_u32(&mut self, endian: Endian) -> Result<u32> {
        Ok(endian.read_u32(self.take(4)?))
    }

    /// Reads a u64 in the given byte order.
    #[inline]
    pub fn read_u64(&mut self, endian: Endian) -> Result<u64> {
        Ok(endian.read_u64(self.take(8)?))
    }

    /// Reads a pointer-sized field: u32 when `wide` is false, u64 otherwise.
    #[inline]
    pub fn read_word(&mut self, endian: Endian, wide: bool) -> Result<u64> {
        if wide {
            self.read_u64(endian)
        } else {
            self.read_u32(endian).map(u64::from)
        }
    }

    /// Reads `n` raw bytes.
    #[inline]
    pub fn read_fixed_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Reads a fixed-size byte array such as a 16-byte name field.
    #[inline]
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}
