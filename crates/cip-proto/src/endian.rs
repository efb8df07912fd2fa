//! Endian-configurable integer pack/unpack (C1).
//!
//! Every multi-byte integer on the wire is produced under a profile-chosen
//! byte order (`cip-core`'s `Profile` carries one `Endianness` per layer).
//! `byteorder::{LittleEndian, BigEndian}` are monomorphic types, so they
//! can't be selected at runtime; `Endianness` is the runtime switch, and
//! each method dispatches to the matching `byteorder` implementation.
//! This is the one place C1 primitives live - callers never hardcode
//! `LittleEndian`/`BigEndian` directly.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Runtime-selectable byte order for a wire layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    /// Least-significant byte first (ODVA default for both ENIP and CIP).
    Little,
    /// Most-significant byte first (used by `legacy_compat` and some
    /// vendor variants).
    Big,
}

impl Endianness {
    /// Read a u16 at the start of `buf`.
    #[must_use]
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Self::Little => LittleEndian::read_u16(buf),
            Self::Big => BigEndian::read_u16(buf),
        }
    }

    /// Read a u32 at the start of `buf`.
    #[must_use]
    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Self::Little => LittleEndian::read_u32(buf),
            Self::Big => BigEndian::read_u32(buf),
        }
    }

    /// Read a u64 at the start of `buf`.
    #[must_use]
    pub fn read_u64(self, buf: &[u8]) -> u64 {
        match self {
            Self::Little => LittleEndian::read_u64(buf),
            Self::Big => BigEndian::read_u64(buf),
        }
    }

    /// Read an f32 at the start of `buf`.
    #[must_use]
    pub fn read_f32(self, buf: &[u8]) -> f32 {
        match self {
            Self::Little => LittleEndian::read_f32(buf),
            Self::Big => BigEndian::read_f32(buf),
        }
    }

    /// Read an f64 at the start of `buf`.
    #[must_use]
    pub fn read_f64(self, buf: &[u8]) -> f64 {
        match self {
            Self::Little => LittleEndian::read_f64(buf),
            Self::Big => BigEndian::read_f64(buf),
        }
    }

    /// Write a u16 to the start of `buf` (must be at least 2 bytes).
    pub fn write_u16(self, buf: &mut [u8], v: u16) {
        match self {
            Self::Little => LittleEndian::write_u16(buf, v),
            Self::Big => BigEndian::write_u16(buf, v),
        }
    }

    /// Write a u32 to the start of `buf` (must be at least 4 bytes).
    pub fn write_u32(self, buf: &mut [u8], v: u32) {
        match self {
            Self::Little => LittleEndian::write_u32(buf, v),
            Self::Big => BigEndian::write_u32(buf, v),
        }
    }

    /// Write a u64 to the start of `buf` (must be at least 8 bytes).
    pub fn write_u64(self, buf: &mut [u8], v: u64) {
        match self {
            Self::Little => LittleEndian::write_u64(buf, v),
            Self::Big => BigEndian::write_u64(buf, v),
        }
    }

    /// Write an f32 to the start of `buf` (must be at least 4 bytes).
    pub fn write_f32(self, buf: &mut [u8], v: f32) {
        match self {
            Self::Little => LittleEndian::write_f32(buf, v),
            Self::Big => BigEndian::write_f32(buf, v),
        }
    }

    /// Write an f64 to the start of `buf` (must be at least 8 bytes).
    pub fn write_f64(self, buf: &mut [u8], v: f64) {
        match self {
            Self::Little => LittleEndian::write_f64(buf, v),
            Self::Big => BigEndian::write_f64(buf, v),
        }
    }

    /// Append a u16 to a growable buffer.
    pub fn put_u16(self, buf: &mut Vec<u8>, v: u16) {
        let mut tmp = [0u8; 2];
        self.write_u16(&mut tmp, v);
        buf.extend_from_slice(&tmp);
    }

    /// Append a u32 to a growable buffer.
    pub fn put_u32(self, buf: &mut Vec<u8>, v: u32) {
        let mut tmp = [0u8; 4];
        self.write_u32(&mut tmp, v);
        buf.extend_from_slice(&tmp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_and_big_disagree_on_multi_byte_values() {
        let mut le = [0u8; 4];
        let mut be = [0u8; 4];
        Endianness::Little.write_u32(&mut le, 0x0102_0304);
        Endianness::Big.write_u32(&mut be, 0x0102_0304);
        assert_eq!(le, [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(be, [0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn put_u16_round_trips() {
        let mut buf = Vec::new();
        Endianness::Little.put_u16(&mut buf, 0xABCD);
        assert_eq!(Endianness::Little.read_u16(&buf), 0xABCD);
    }
}
