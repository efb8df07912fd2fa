//! CIP request/response codec and primitive value codec (C3).
//!
//! Per §9's redesign flag, framing policy is never read from a hidden
//! global: every encode/decode call here takes an explicit
//! [`CipCodecOptions`]. `cip-core`'s `Profile` is the thing that knows how
//! to build one of these; this crate only knows what to do with it.

use crate::{
    endian::Endianness,
    epath::EPath,
    error::{ProtocolError, Result},
};

/// The subset of profile policy the CIP codec needs (§4.2, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipCodecOptions {
    /// Byte order for multi-byte CIP-layer integers (REAL/LREAL use this
    /// too; STRING length prefixes are always little-endian regardless).
    pub byte_order: Endianness,
    /// Whether request encoding includes the path-size word.
    pub include_path_size: bool,
    /// Whether response encoding includes the reserved byte after the
    /// echoed service code.
    pub include_resp_reserved: bool,
}

impl CipCodecOptions {
    /// Strict ODVA framing: little-endian, path-size present, reserved
    /// byte present.
    #[must_use]
    pub const fn strict_odva() -> Self {
        Self { byte_order: Endianness::Little, include_path_size: true, include_resp_reserved: true }
    }
}

/// A decoded or to-be-encoded CIP request (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipRequest {
    /// Service code (high bit clear).
    pub service: u8,
    /// Request path.
    pub path: EPath,
    /// Request-specific payload bytes.
    pub payload: Vec<u8>,
}

/// A decoded or to-be-encoded CIP response (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipResponse {
    /// Echoed service code, high bit set (`request.service | 0x80`).
    pub service: u8,
    /// General status byte.
    pub general_status: u8,
    /// Extended status, in 16-bit words.
    pub extended_status: Vec<u16>,
    /// Response payload bytes.
    pub payload: Vec<u8>,
}

impl CipRequest {
    /// Encode: `service | [path_size_words | path_bytes] | payload`.
    #[must_use]
    pub fn encode(&self, opts: CipCodecOptions) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.payload.len());
        out.push(self.service);
        let path_bytes = self.path.encode();
        if opts.include_path_size {
            debug_assert_eq!(path_bytes.len() % 2, 0);
            out.push((path_bytes.len() / 2) as u8);
        }
        out.extend_from_slice(&path_bytes);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a request. When `include_path_size` is false, the path is
    /// auto-terminated (decoded until an unparseable byte, per §4.1); the
    /// remainder of `buf` is the payload either way.
    pub fn decode(buf: &[u8], opts: CipCodecOptions) -> Result<Self> {
        let service = *buf.first().ok_or(ProtocolError::Truncated { expected: 1, actual: 0 })?;
        let mut pos = 1;

        let path_len_hint = if opts.include_path_size {
            let words =
                *buf.get(pos).ok_or(ProtocolError::Truncated { expected: pos + 1, actual: buf.len() })?
                    as usize;
            pos += 1;
            Some(words * 2)
        } else {
            None
        };

        let (path, consumed) = EPath::decode(&buf[pos..], path_len_hint)?;
        pos += consumed;
        let payload = buf[pos..].to_vec();

        Ok(Self { service, path, payload })
    }
}

impl CipResponse {
    /// Encode: `service_echo | [reserved] | general_status | ext_status_word_count | ext_status | payload`.
    #[must_use]
    pub fn encode(&self, opts: CipCodecOptions) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.extended_status.len() * 2 + self.payload.len());
        out.push(self.service);
        if opts.include_resp_reserved {
            out.push(0x00);
        }
        out.push(self.general_status);
        out.push(self.extended_status.len() as u8);
        for word in &self.extended_status {
            opts.byte_order.put_u16(&mut out, *word);
        }
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a response.
    pub fn decode(buf: &[u8], opts: CipCodecOptions) -> Result<Self> {
        let service = *buf.first().ok_or(ProtocolError::Truncated { expected: 1, actual: 0 })?;
        let mut pos = 1;
        if opts.include_resp_reserved {
            pos += 1;
        }
        let general_status = *buf
            .get(pos)
            .ok_or(ProtocolError::Truncated { expected: pos + 1, actual: buf.len() })?;
        pos += 1;
        let ext_word_count = *buf
            .get(pos)
            .ok_or(ProtocolError::Truncated { expected: pos + 1, actual: buf.len() })?
            as usize;
        pos += 1;

        let ext_bytes_needed = ext_word_count * 2;
        if buf.len() < pos + ext_bytes_needed {
            return Err(ProtocolError::Truncated { expected: pos + ext_bytes_needed, actual: buf.len() });
        }
        let mut extended_status = Vec::with_capacity(ext_word_count);
        for i in 0..ext_word_count {
            extended_status.push(opts.byte_order.read_u16(&buf[pos + i * 2..]));
        }
        pos += ext_bytes_needed;

        let payload = buf[pos..].to_vec();
        Ok(Self { service, general_status, extended_status, payload })
    }
}

/// A primitive CIP value (§3, §4.3).
#[derive(Debug, Clone, PartialEq)]
pub enum CipValue {
    /// `BOOL`: one byte, non-zero is true.
    Bool(bool),
    /// `SINT`: 8-bit signed.
    Sint(i8),
    /// `INT`: 16-bit signed.
    Int(i16),
    /// `DINT`: 32-bit signed.
    Dint(i32),
    /// `LINT`: 64-bit signed.
    Lint(i64),
    /// `REAL`: IEEE-754 single precision.
    Real(f32),
    /// `LREAL`: IEEE-754 double precision.
    Lreal(f64),
    /// `STRING`: length-prefixed ASCII/UTF-8 bytes.
    Str(String),
}

impl CipValue {
    /// Encode this value under `byte_order` (applies to everything except
    /// the STRING length prefix, which ODVA fixes as little-endian).
    #[must_use]
    pub fn encode(&self, byte_order: Endianness) -> Vec<u8> {
        match self {
            Self::Bool(b) => vec![u8::from(*b)],
            Self::Sint(v) => vec![*v as u8],
            Self::Int(v) => {
                let mut buf = vec![0u8; 2];
                byte_order.write_u16(&mut buf, *v as u16);
                buf
            },
            Self::Dint(v) => {
                let mut buf = vec![0u8; 4];
                byte_order.write_u32(&mut buf, *v as u32);
                buf
            },
            Self::Lint(v) => {
                let mut buf = vec![0u8; 8];
                byte_order.write_u64(&mut buf, *v as u64);
                buf
            },
            Self::Real(v) => {
                let mut buf = vec![0u8; 4];
                byte_order.write_f32(&mut buf, *v);
                buf
            },
            Self::Lreal(v) => {
                let mut buf = vec![0u8; 8];
                byte_order.write_f64(&mut buf, *v);
                buf
            },
            Self::Str(s) => {
                let mut buf = Vec::with_capacity(2 + s.len());
                Endianness::Little.put_u16(&mut buf, s.len() as u16);
                buf.extend_from_slice(s.as_bytes());
                buf
            },
        }
    }

    /// Decode a value of the given CIP data-type code (§4.3's primitive
    /// set; codes follow the common ODVA numbering).
    pub fn decode(type_code: u16, buf: &[u8], byte_order: Endianness) -> Result<Self> {
        let need = |n: usize| -> Result<()> {
            if buf.len() < n {
                Err(ProtocolError::Truncated { expected: n, actual: buf.len() })
            } else {
                Ok(())
            }
        };
        match type_code {
            0x00C1 => {
                need(1)?;
                Ok(Self::Bool(buf[0] != 0))
            },
            0x00C2 => {
                need(1)?;
                Ok(Self::Sint(buf[0] as i8))
            },
            0x00C3 => {
                need(2)?;
                Ok(Self::Int(byte_order.read_u16(buf) as i16))
            },
            0x00C4 => {
                need(4)?;
                Ok(Self::Dint(byte_order.read_u32(buf) as i32))
            },
            0x00C5 => {
                need(8)?;
                Ok(Self::Lint(byte_order.read_u64(buf) as i64))
            },
            0x00CA => {
                need(4)?;
                Ok(Self::Real(byte_order.read_f32(buf)))
            },
            0x00CB => {
                need(8)?;
                Ok(Self::Lreal(byte_order.read_f64(buf)))
            },
            0x00D0 => {
                need(2)?;
                let len = Endianness::Little.read_u16(buf) as usize;
                need(2 + len)?;
                let s = String::from_utf8(buf[2..2 + len].to_vec()).map_err(|e| {
                    ProtocolError::InvalidValue { reason: format!("STRING bytes not UTF-8: {e}") }
                })?;
                Ok(Self::Str(s))
            },
            other => Err(ProtocolError::InvalidValue {
                reason: format!("unsupported CIP data type code {other:#06x}"),
            }),
        }
    }

    /// The ODVA data-type code for this value's variant.
    #[must_use]
    pub fn type_code(&self) -> u16 {
        match self {
            Self::Bool(_) => 0x00C1,
            Self::Sint(_) => 0x00C2,
            Self::Int(_) => 0x00C3,
            Self::Dint(_) => 0x00C4,
            Self::Lint(_) => 0x00C5,
            Self::Real(_) => 0x00CA,
            Self::Lreal(_) => 0x00CB,
            Self::Str(_) => 0x00D0,
        }
    }
}
