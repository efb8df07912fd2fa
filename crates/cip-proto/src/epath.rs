//! EPATH segment encode/decode (C1).
//!
//! A CIP path is a sequence of typed segments, each a 1-byte header plus a
//! 1..N byte payload. §3 defines the logical segments of interest (class,
//! instance, attribute), port/routing segments, pad bytes, and symbolic
//! (ANSI tag name) segments.

use crate::error::{ProtocolError, Result};

/// Logical segment headers (§3).
const HDR_CLASS_8: u8 = 0x20;
const HDR_CLASS_16: u8 = 0x21;
const HDR_INSTANCE_8: u8 = 0x24;
const HDR_INSTANCE_16: u8 = 0x25;
const HDR_ATTRIBUTE_8: u8 = 0x30;
const HDR_ATTRIBUTE_16: u8 = 0x31;
const HDR_CONNECTION_POINT_8: u8 = 0x2C;
const HDR_CONNECTION_POINT_16: u8 = 0x2D;
const HDR_SYMBOLIC: u8 = 0x91;
const HDR_PAD: u8 = 0x00;

/// A single decoded EPATH segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Class ID (8- or 16-bit on the wire, always carried as u16 decoded).
    Class(u16),
    /// Instance ID.
    Instance(u16),
    /// Attribute ID.
    Attribute(u16),
    /// Connection point (used by I/O connection paths).
    ConnectionPoint(u16),
    /// Port/routing segment: port number and the link address bytes.
    Port {
        /// Port number (top 3 bits of the header are zero).
        port: u8,
        /// Link address, raw bytes as encoded (numeric or ASCII per ODVA).
        link: Vec<u8>,
    },
    /// Symbolic tag-name segment.
    Symbolic(String),
}

/// A fully decoded logical path: an ordered list of segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EPath {
    /// Segments in wire order.
    pub segments: Vec<Segment>,
}

impl EPath {
    /// Build a path from `{class, instance, attribute}` - the common case
    /// for Get/Set_Attribute_Single.
    #[must_use]
    pub fn class_instance_attribute(class: u16, instance: u16, attribute: u16) -> Self {
        Self {
            segments: vec![
                Segment::Class(class),
                Segment::Instance(instance),
                Segment::Attribute(attribute),
            ],
        }
    }

    /// Build a path from `{class, instance}` only.
    #[must_use]
    pub fn class_instance(class: u16, instance: u16) -> Self {
        Self { segments: vec![Segment::Class(class), Segment::Instance(instance)] }
    }

    /// Build a single symbolic (tag name) path.
    #[must_use]
    pub fn symbolic(name: impl Into<String>) -> Self {
        Self { segments: vec![Segment::Symbolic(name.into())] }
    }

    /// Convenience accessor for the first `Class` segment, if any.
    #[must_use]
    pub fn class(&self) -> Option<u16> {
        self.segments.iter().find_map(|s| match s {
            Segment::Class(c) => Some(*c),
            _ => None,
        })
    }

    /// Convenience accessor for the first `Instance` segment, if any.
    #[must_use]
    pub fn instance(&self) -> Option<u16> {
        self.segments.iter().find_map(|s| match s {
            Segment::Instance(i) => Some(*i),
            _ => None,
        })
    }

    /// Convenience accessor for the first `Attribute` segment, if any.
    #[must_use]
    pub fn attribute(&self) -> Option<u16> {
        self.segments.iter().find_map(|s| match s {
            Segment::Attribute(a) => Some(*a),
            _ => None,
        })
    }

    /// Convenience accessor for the first `Symbolic` segment's name, if any.
    #[must_use]
    pub fn tag_name(&self) -> Option<&str> {
        self.segments.iter().find_map(|s| match s {
            Segment::Symbolic(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Encode this path to its wire byte form.
    ///
    /// Invariant (§3, §8): the result is always an even number of bytes -
    /// every segment that would produce an odd count pads with a trailing
    /// `0x00`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for seg in &self.segments {
            encode_segment(seg, &mut out);
        }
        debug_assert_eq!(out.len() % 2, 0, "EPATH encoding must always be even length");
        out
    }

    /// Decode a path from `buf`, stopping either at `max_len` bytes (when
    /// a path-size hint is known) or at the first unparseable byte
    /// (auto-terminate, used when no hint is available).
    ///
    /// Returns the parsed path and the number of bytes actually consumed.
    pub fn decode(buf: &[u8], max_len: Option<usize>) -> Result<(Self, usize)> {
        let limit = max_len.unwrap_or(buf.len()).min(buf.len());
        let mut pos = 0usize;
        let mut segments = Vec::new();

        while pos < limit {
            let header = buf[pos];

            if header == HDR_PAD {
                pos += 1;
                continue;
            }

            if header & 0xE0 == 0 {
                let (seg, consumed) = decode_port_segment(&buf[pos..limit])?;
                segments.push(seg);
                pos += consumed;
                continue;
            }

            match header {
                HDR_CLASS_8 | HDR_INSTANCE_8 | HDR_ATTRIBUTE_8 | HDR_CONNECTION_POINT_8 => {
                    let value = *buf.get(pos + 1).ok_or(ProtocolError::Truncated {
                        expected: pos + 2,
                        actual: buf.len(),
                    })? as u16;
                    segments.push(logical_segment(header, value));
                    pos += 2;
                },
                HDR_CLASS_16 | HDR_INSTANCE_16 | HDR_ATTRIBUTE_16 | HDR_CONNECTION_POINT_16 => {
                    if pos + 4 > buf.len() {
                        return Err(ProtocolError::Truncated { expected: pos + 4, actual: buf.len() });
                    }
                    // 16-bit logical segments carry a reserved pad byte
                    // at offset+1, then the little-endian value.
                    let value = u16::from_le_bytes([buf[pos + 2], buf[pos + 3]]);
                    segments.push(logical_segment(header, value));
                    pos += 4;
                },
                HDR_SYMBOLIC => {
                    let (name, consumed) = decode_symbolic(&buf[pos..])?;
                    segments.push(Segment::Symbolic(name));
                    pos += consumed;
                },
                other => return Err(ProtocolError::UnknownSegment { header: other }),
            }
        }

        Ok((Self { segments }, pos))
    }
}

fn logical_segment(header: u8, value: u16) -> Segment {
    match header {
        HDR_CLASS_8 | HDR_CLASS_16 => Segment::Class(value),
        HDR_INSTANCE_8 | HDR_INSTANCE_16 => Segment::Instance(value),
        HDR_ATTRIBUTE_8 | HDR_ATTRIBUTE_16 => Segment::Attribute(value),
        HDR_CONNECTION_POINT_8 | HDR_CONNECTION_POINT_16 => Segment::ConnectionPoint(value),
        _ => unreachable!("logical_segment called with non-logical header"),
    }
}

fn encode_segment(seg: &Segment, out: &mut Vec<u8>) {
    match seg {
        Segment::Class(v) => encode_logical(out, HDR_CLASS_8, HDR_CLASS_16, *v),
        Segment::Instance(v) => encode_logical(out, HDR_INSTANCE_8, HDR_INSTANCE_16, *v),
        Segment::Attribute(v) => encode_logical(out, HDR_ATTRIBUTE_8, HDR_ATTRIBUTE_16, *v),
        Segment::ConnectionPoint(v) => {
            encode_logical(out, HDR_CONNECTION_POINT_8, HDR_CONNECTION_POINT_16, *v);
        },
        Segment::Port { port, link } => {
            debug_assert!(*port & 0xE0 == 0, "port number must fit in low 5 bits");
            out.push(*port);
            out.push(link.len() as u8);
            out.extend_from_slice(link);
            if (link.len() + 2) % 2 != 0 {
                out.push(HDR_PAD);
            }
        },
        Segment::Symbolic(name) => encode_symbolic(out, name),
    }
}

/// 8/16-bit flavor is chosen by magnitude (`<= 255 => 8-bit`), per §4.1.
fn encode_logical(out: &mut Vec<u8>, header8: u8, header16: u8, value: u16) {
    if value <= 0xFF {
        out.push(header8);
        out.push(value as u8);
    } else {
        out.push(header16);
        out.push(0); // reserved pad byte
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn encode_symbolic(out: &mut Vec<u8>, name: &str) {
    debug_assert!(name.len() <= 255, "symbolic segment length must fit in one byte");
    out.push(HDR_SYMBOLIC);
    out.push(name.len() as u8);
    out.extend_from_slice(name.as_bytes());
    if name.len() % 2 != 0 {
        out.push(HDR_PAD);
    }
}

fn decode_symbolic(buf: &[u8]) -> Result<(String, usize)> {
    let len = *buf.get(1).ok_or(ProtocolError::Truncated { expected: 2, actual: buf.len() })?
        as usize;
    let start = 2;
    let end = start + len;
    if buf.len() < end {
        return Err(ProtocolError::Truncated { expected: end, actual: buf.len() });
    }
    let name_bytes = &buf[start..end];
    if !name_bytes.is_ascii() {
        return Err(ProtocolError::MalformedSymbolic {
            reason: "symbolic segment bytes are not ASCII".to_string(),
        });
    }
    let name = String::from_utf8_lossy(name_bytes).into_owned();
    let mut consumed = end;
    if len % 2 != 0 {
        // Odd-length symbolic segments must be padded; treat a missing
        // pad byte as malformed rather than silently accepting it.
        if buf.len() <= end {
            return Err(ProtocolError::MalformedSymbolic {
                reason: "odd-length symbolic segment missing pad byte".to_string(),
            });
        }
        consumed += 1;
    }
    Ok((name, consumed))
}

/// Port segments may appear before logical segments; the consumed length
/// must still be counted so callers don't misparse what follows.
fn decode_port_segment(buf: &[u8]) -> Result<(Segment, usize)> {
    let header = *buf.first().ok_or(ProtocolError::Truncated { expected: 1, actual: 0 })?;
    let port = header & 0x1F;
    let extended = header & 0x10 != 0;
    if extended {
        // Extended port numbers carry a 16-bit port after the link-size
        // byte; not exercised by this harness's profiles but parsed so
        // decode doesn't choke on a conformant producer.
        let link_len =
            *buf.get(1).ok_or(ProtocolError::Truncated { expected: 2, actual: buf.len() })?
                as usize;
        let start = 4; // header + reserved + 2-byte extended port
        let end = start + link_len;
        if buf.len() < end {
            return Err(ProtocolError::Truncated { expected: end, actual: buf.len() });
        }
        let link = buf[start..end].to_vec();
        let mut consumed = end;
        if consumed % 2 != 0 {
            consumed += 1;
        }
        return Ok((Segment::Port { port, link }, consumed));
    }

    let link_len =
        *buf.get(1).ok_or(ProtocolError::Truncated { expected: 2, actual: buf.len() })? as usize;
    let start = 2;
    let end = start + link_len;
    if buf.len() < end {
        return Err(ProtocolError::Truncated { expected: end, actual: buf.len() });
    }
    let link = buf[start..end].to_vec();
    let mut consumed = end;
    if consumed % 2 != 0 {
        consumed += 1;
    }
    Ok((Segment::Port { port, link }, consumed))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn class_instance_attribute_strict_encoding() {
        let path = EPath::class_instance_attribute(0x04, 0x65, 0x03);
        let bytes = path.encode();
        assert_eq!(bytes, vec![0x20, 0x04, 0x24, 0x65, 0x30, 0x03]);
    }

    #[test]
    fn sixteen_bit_class_used_above_255() {
        let path = EPath::class_instance(0x1234, 1);
        let bytes = path.encode();
        assert_eq!(&bytes[0..2], &[0x21, 0x00]);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 0x1234);
    }

    #[test]
    fn symbolic_round_trips_with_pad() {
        let path = EPath::symbolic("Tag1");
        let bytes = path.encode();
        assert_eq!(bytes.len() % 2, 0);
        let (decoded, consumed) = EPath::decode(&bytes, None).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.tag_name(), Some("Tag1"));
    }

    #[test]
    fn odd_length_tag_name_gets_padded() {
        let path = EPath::symbolic("Odd");
        let bytes = path.encode();
        assert_eq!(bytes.len(), 2 + 3 + 1);
        assert_eq!(*bytes.last().unwrap(), 0x00);
    }

    #[test]
    fn unknown_header_is_rejected() {
        let err = EPath::decode(&[0xFF, 0x00], None).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownSegment { header: 0xFF }));
    }

    fn arb_path() -> impl Strategy<Value = EPath> {
        (0u16..=0xFFFF, 0u16..=0xFFFF, 0u16..=0xFF).prop_map(|(class, instance, attribute)| {
            EPath::class_instance_attribute(class, instance, attribute)
        })
    }

    proptest! {
        #[test]
        fn epath_round_trips(path in arb_path()) {
            let bytes = path.encode();
            prop_assert_eq!(bytes.len() % 2, 0);
            let (decoded, consumed) = EPath::decode(&bytes, None).unwrap();
            prop_assert_eq!(consumed, bytes.len());
            prop_assert_eq!(decoded, path);
        }

        #[test]
        fn symbolic_round_trips_for_any_ascii_name(name in "[A-Za-z0-9_]{1,64}") {
            let path = EPath::symbolic(&name);
            let bytes = path.encode();
            let (decoded, consumed) = EPath::decode(&bytes, None).unwrap();
            prop_assert_eq!(consumed, bytes.len());
            prop_assert_eq!(decoded.tag_name(), Some(name.as_str()));
        }
    }
}
