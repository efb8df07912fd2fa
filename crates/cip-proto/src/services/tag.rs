//! Rockwell-style tag service payload builders (C6, C11).

use crate::{
    endian::Endianness,
    error::{ProtocolError, Result},
};

/// Build a `Read_Tag` request payload: `elements u16`.
#[must_use]
pub fn build_read_tag(elements: u16, byte_order: Endianness) -> Vec<u8> {
    let mut out = vec![0u8; 2];
    byte_order.write_u16(&mut out, elements);
    out
}

/// Build a `Read_Tag_Fragmented` request payload: `elements u16 | offset u32`.
#[must_use]
pub fn build_read_tag_fragmented(elements: u16, offset: u32, byte_order: Endianness) -> Vec<u8> {
    let mut out = Vec::with_capacity(6);
    byte_order.put_u16(&mut out, elements);
    byte_order.put_u32(&mut out, offset);
    out
}

/// Build a `Write_Tag` request payload: `type u16 | elements u16 | data`.
#[must_use]
pub fn build_write_tag(type_code: u16, elements: u16, data: &[u8], byte_order: Endianness) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len());
    byte_order.put_u16(&mut out, type_code);
    byte_order.put_u16(&mut out, elements);
    out.extend_from_slice(data);
    out
}

/// A fragmented `Write_Tag_Fragmented` request, parsed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagWriteFragmented {
    /// Declared CIP data type of the tag being written.
    pub type_code: u16,
    /// Element count in this fragment.
    pub elements: u16,
    /// Byte offset into the tag's backing storage.
    pub offset: u32,
    /// Fragment data.
    pub data: Vec<u8>,
}

/// Build a `Write_Tag_Fragmented` request payload: `type u16 | elements
/// u16 | offset u32 | data`.
#[must_use]
pub fn build_write_tag_fragmented(req: &TagWriteFragmented, byte_order: Endianness) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + req.data.len());
    byte_order.put_u16(&mut out, req.type_code);
    byte_order.put_u16(&mut out, req.elements);
    byte_order.put_u32(&mut out, req.offset);
    out.extend_from_slice(&req.data);
    out
}

/// Parse a `Write_Tag_Fragmented` request payload.
pub fn parse_write_tag_fragmented(buf: &[u8], byte_order: Endianness) -> Result<TagWriteFragmented> {
    if buf.len() < 8 {
        return Err(ProtocolError::Truncated { expected: 8, actual: buf.len() });
    }
    let type_code = byte_order.read_u16(&buf[0..2]);
    let elements = byte_order.read_u16(&buf[2..4]);
    let offset = byte_order.read_u32(&buf[4..8]);
    let data = buf[8..].to_vec();
    Ok(TagWriteFragmented { type_code, elements, offset, data })
}

/// A `Read_Tag`/`Read_Tag_Fragmented` success response: `type u16 |
/// elements u16 | data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTagResponse {
    /// CIP data type of the tag.
    pub type_code: u16,
    /// Element count returned.
    pub elements: u16,
    /// Element data.
    pub data: Vec<u8>,
}

/// Build a `Read_Tag`/`Read_Tag_Fragmented` success response payload.
#[must_use]
pub fn build_read_tag_response(resp: &ReadTagResponse, byte_order: Endianness) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + resp.data.len());
    byte_order.put_u16(&mut out, resp.type_code);
    byte_order.put_u16(&mut out, resp.elements);
    out.extend_from_slice(&resp.data);
    out
}

/// Parse a `Read_Tag`/`Read_Tag_Fragmented` response payload.
pub fn parse_read_tag_response(buf: &[u8], byte_order: Endianness) -> Result<ReadTagResponse> {
    if buf.len() < 4 {
        return Err(ProtocolError::Truncated { expected: 4, actual: buf.len() });
    }
    let type_code = byte_order.read_u16(&buf[0..2]);
    let elements = byte_order.read_u16(&buf[2..4]);
    let data = buf[4..].to_vec();
    Ok(ReadTagResponse { type_code, elements, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_tag_fragmented_carries_offset() {
        let bytes = build_read_tag_fragmented(4, 16, Endianness::Little);
        assert_eq!(bytes.len(), 6);
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), 4);
        assert_eq!(u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]), 16);
    }

    #[test]
    fn read_tag_fragmented_carries_offset_big_endian() {
        let bytes = build_read_tag_fragmented(4, 16, Endianness::Big);
        assert_eq!(bytes.len(), 6);
        assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), 4);
        assert_eq!(u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]), 16);
    }

    #[test]
    fn write_tag_fragmented_round_trips() {
        let req = TagWriteFragmented { type_code: 0x00C4, elements: 2, offset: 8, data: vec![1, 2, 3, 4] };
        let bytes = build_write_tag_fragmented(&req, Endianness::Little);
        let parsed = parse_write_tag_fragmented(&bytes, Endianness::Little).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn write_tag_fragmented_round_trips_big_endian() {
        let req = TagWriteFragmented { type_code: 0x00C4, elements: 2, offset: 8, data: vec![1, 2, 3, 4] };
        let bytes = build_write_tag_fragmented(&req, Endianness::Big);
        let parsed = parse_write_tag_fragmented(&bytes, Endianness::Big).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn read_tag_response_round_trips() {
        let resp = ReadTagResponse { type_code: 0x00C4, elements: 1, data: vec![9, 9, 9, 9] };
        let bytes = build_read_tag_response(&resp, Endianness::Little);
        let parsed = parse_read_tag_response(&bytes, Endianness::Little).unwrap();
        assert_eq!(parsed, resp);
    }

    #[test]
    fn read_tag_response_round_trips_big_endian() {
        let resp = ReadTagResponse { type_code: 0x00C4, elements: 1, data: vec![9, 9, 9, 9] };
        let bytes = build_read_tag_response(&resp, Endianness::Big);
        let parsed = parse_read_tag_response(&bytes, Endianness::Big).unwrap();
        assert_eq!(parsed, resp);
    }
}
