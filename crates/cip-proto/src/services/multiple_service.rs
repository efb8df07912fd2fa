//! `Multiple_Service_Packet` request/response framing (C6, §4.6/§4.9).
//!
//! Wire layout: `service_count u16 | offset u16 * service_count | service
//! bytes...`. Offsets are measured from the start of the service-count
//! field and must be strictly increasing and in-bounds.

use crate::{
    endian::Endianness,
    error::{ProtocolError, Result},
};

/// Split a decoded `Multiple_Service_Packet` request payload into its
/// constituent embedded-service byte slices.
pub fn parse_multiple_service_request(buf: &[u8], byte_order: Endianness) -> Result<Vec<Vec<u8>>> {
    if buf.len() < 2 {
        return Err(ProtocolError::Truncated { expected: 2, actual: buf.len() });
    }
    let count = byte_order.read_u16(&buf[0..2]) as usize;
    let table_end = 2 + count * 2;
    if buf.len() < table_end {
        return Err(ProtocolError::Truncated { expected: table_end, actual: buf.len() });
    }

    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let pos = 2 + i * 2;
        offsets.push(byte_order.read_u16(&buf[pos..pos + 2]) as usize);
    }
    for pair in offsets.windows(2) {
        if pair[1] <= pair[0] {
            return Err(ProtocolError::InvalidOffsetTable {
                reason: format!("offsets must be strictly increasing, got {} then {}", pair[0], pair[1]),
            });
        }
    }

    let mut services = Vec::with_capacity(count);
    for (i, &offset) in offsets.iter().enumerate() {
        if offset > buf.len() {
            return Err(ProtocolError::InvalidOffsetTable {
                reason: format!("offset {offset} exceeds payload length {}", buf.len()),
            });
        }
        let end = offsets.get(i + 1).copied().unwrap_or(buf.len());
        if end > buf.len() || end < offset {
            return Err(ProtocolError::InvalidOffsetTable { reason: format!("bad service bounds [{offset}, {end})") });
        }
        services.push(buf[offset..end].to_vec());
    }
    Ok(services)
}

/// Build a `Multiple_Service_Packet` request payload from a list of
/// already-encoded embedded service requests.
#[must_use]
pub fn split_multiple_service_request(services: &[Vec<u8>], byte_order: Endianness) -> Vec<u8> {
    let count = services.len();
    let table_bytes = 2 + count * 2;
    let mut offsets = Vec::with_capacity(count);
    let mut running = table_bytes;
    for service in services {
        offsets.push(running);
        running += service.len();
    }

    let mut out = Vec::with_capacity(running);
    let mut count_bytes = [0u8; 2];
    byte_order.write_u16(&mut count_bytes, count as u16);
    out.extend_from_slice(&count_bytes);
    for offset in &offsets {
        let mut offset_bytes = [0u8; 2];
        byte_order.write_u16(&mut offset_bytes, *offset as u16);
        out.extend_from_slice(&offset_bytes);
    }
    for service in services {
        out.extend_from_slice(service);
    }
    out
}

/// Embed already-encoded CIP responses into a `Multiple_Service_Packet`
/// response payload, same offset-table framing as the request.
#[must_use]
pub fn embed_responses(responses: &[Vec<u8>], byte_order: Endianness) -> Vec<u8> {
    split_multiple_service_request(responses, byte_order)
}
