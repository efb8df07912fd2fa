//! `Forward_Open` / `Large_Forward_Open` / `Forward_Close` payload builders (C6).

use crate::{endian::Endianness, epath::EPath, error::Result};

/// Connection type bits for the connection-parameter bitfield (ODVA
/// Vol 1 Table 3-5.8, simplified to what the harness needs to vary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSizeClass {
    /// Fixed, declared size fits in a byte.
    Fixed8,
    /// Fixed, declared size needs 16 bits.
    Fixed16,
    /// Fixed, declared size needs 32 bits.
    Fixed32,
    /// Size is negotiated/variable.
    Variable,
}

/// Parameters to build a `Forward_Open` request (§4.6).
#[derive(Debug, Clone)]
pub struct ForwardOpenParams {
    /// Priority/time-tick byte.
    pub priority_tick: u8,
    /// Connection timeout ticks.
    pub timeout_ticks: u8,
    /// O->T RPI, microseconds.
    pub o_to_t_rpi_us: u32,
    /// T->O RPI, microseconds.
    pub t_to_o_rpi_us: u32,
    /// O->T connection size in bytes.
    pub o_to_t_size: u16,
    /// T->O connection size in bytes.
    pub t_to_o_size: u16,
    /// Size class shared by both directions (simplification: the harness
    /// doesn't need independent O->T/T->O size classes to stress a DPI
    /// engine).
    pub size_class: ConnectionSizeClass,
    /// Transport class/trigger byte (commonly `0xA3`/`0x01`/`0x03`...).
    pub transport_class_trigger: u8,
    /// Connection path (already-encoded EPATH bytes, or composed from
    /// logical segments via `connection_path_segments`).
    pub connection_path: EPath,
    /// `true` for `Large_Forward_Open` (adds connection serial / API
    /// fields with 32-bit width).
    pub large: bool,
}

fn connection_parameters(size: u16, size_class: ConnectionSizeClass, large: bool, byte_order: Endianness) -> Vec<u8> {
    // bits: size (variable width) | size-class flag | connection type | priority | redundant owner
    let class_bits: u32 = match size_class {
        ConnectionSizeClass::Fixed8 => 0b00,
        ConnectionSizeClass::Fixed16 => 0b01,
        ConnectionSizeClass::Fixed32 => 0b10,
        ConnectionSizeClass::Variable => 0b11,
    };
    let word = u32::from(size) | (class_bits << 14);
    if large {
        let mut out = vec![0u8; 4];
        byte_order.write_u32(&mut out, word);
        out
    } else {
        let mut out = vec![0u8; 2];
        byte_order.write_u16(&mut out, word as u16);
        out
    }
}

/// Build a `Forward_Open`/`Large_Forward_Open` payload (§4.6).
#[must_use]
pub fn build_forward_open(params: &ForwardOpenParams, serial: u32, byte_order: Endianness) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(params.priority_tick);
    out.push(params.timeout_ticks);

    if params.large {
        // O->T connection ID (placeholder, server assigns)
        byte_order.put_u32(&mut out, serial);
        // T->O connection ID placeholder
        byte_order.put_u32(&mut out, serial.wrapping_add(1));
    } else {
        let half = serial as u16;
        byte_order.put_u16(&mut out, half);
        byte_order.put_u16(&mut out, half.wrapping_add(1));
    }

    byte_order.put_u16(&mut out, serial as u16);
    out.extend_from_slice(&[0x00, 0x00]); // originator vendor ID (stub)
    out.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // originator serial number (stub)

    byte_order.put_u32(&mut out, params.o_to_t_rpi_us);
    out.extend_from_slice(&connection_parameters(params.o_to_t_size, params.size_class, params.large, byte_order));
    byte_order.put_u32(&mut out, params.t_to_o_rpi_us);
    out.extend_from_slice(&connection_parameters(params.t_to_o_size, params.size_class, params.large, byte_order));

    out.push(params.transport_class_trigger);

    let path_bytes = params.connection_path.encode();
    out.push((path_bytes.len() / 2) as u8);
    out.extend_from_slice(&path_bytes);

    out
}

/// Minimum length of a successful `Forward_Open` response payload (§8
/// scenario 4: "success CIP payload >= 17 bytes").
pub const FORWARD_OPEN_SUCCESS_MIN_LEN: usize = 17;

/// Build a `Forward_Open` success response payload: two connection IDs,
/// connection serial, originator vendor/serial, actual RPIs.
#[must_use]
pub fn build_forward_open_success(
    o_to_t_id: u32,
    t_to_o_id: u32,
    serial: u32,
    o_to_t_rpi_us: u32,
    t_to_o_rpi_us: u32,
    byte_order: Endianness,
) -> Vec<u8> {
    let mut out = Vec::new();
    byte_order.put_u32(&mut out, o_to_t_id);
    byte_order.put_u32(&mut out, t_to_o_id);
    byte_order.put_u16(&mut out, serial as u16);
    out.extend_from_slice(&[0x00, 0x00]); // vendor id
    out.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // originator serial
    byte_order.put_u32(&mut out, o_to_t_rpi_us);
    byte_order.put_u32(&mut out, t_to_o_rpi_us);
    out.push(0); // application reply size (words)
    out.push(0); // reserved
    debug_assert!(out.len() >= FORWARD_OPEN_SUCCESS_MIN_LEN);
    out
}

/// Parsed `Forward_Open`/`Large_Forward_Open` success response payload,
/// the inverse of [`build_forward_open_success`] - used by the client
/// driver (§4.13) to recover the server-assigned connection ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardOpenSuccess {
    /// Originator-to-target connection id the server assigned.
    pub o_to_t_id: u32,
    /// Target-to-originator connection id the server assigned.
    pub t_to_o_id: u32,
    /// Echoed connection serial number.
    pub serial: u16,
    /// Actual negotiated O->T RPI, microseconds.
    pub o_to_t_rpi_us: u32,
    /// Actual negotiated T->O RPI, microseconds.
    pub t_to_o_rpi_us: u32,
}

/// Parse a `Forward_Open` success response payload built by
/// [`build_forward_open_success`].
pub fn parse_forward_open_success(payload: &[u8], byte_order: Endianness) -> Result<ForwardOpenSuccess> {
    if payload.len() < FORWARD_OPEN_SUCCESS_MIN_LEN + 7 {
        return Err(crate::error::ProtocolError::Truncated {
            expected: FORWARD_OPEN_SUCCESS_MIN_LEN + 7,
            actual: payload.len(),
        });
    }
    let o_to_t_id = byte_order.read_u32(&payload[0..4]);
    let t_to_o_id = byte_order.read_u32(&payload[4..8]);
    let serial = byte_order.read_u16(&payload[8..10]);
    let o_to_t_rpi_us = byte_order.read_u32(&payload[16..20]);
    let t_to_o_rpi_us = byte_order.read_u32(&payload[20..24]);
    Ok(ForwardOpenSuccess { o_to_t_id, t_to_o_id, serial, o_to_t_rpi_us, t_to_o_rpi_us })
}

/// A `Forward_Open`/`Large_Forward_Open` request, decoded.
#[derive(Debug, Clone)]
pub struct ParsedForwardOpen {
    /// Negotiated parameters (size class inferred from the O->T word).
    pub params: ForwardOpenParams,
    /// Connection serial number, for later `Forward_Close` matching.
    pub serial: u16,
}

fn parse_connection_parameters(word: u32, large: bool) -> (u16, ConnectionSizeClass) {
    let class_bits = (word >> 14) & 0b11;
    let size_class = match class_bits {
        0b00 => ConnectionSizeClass::Fixed8,
        0b01 => ConnectionSizeClass::Fixed16,
        0b10 => ConnectionSizeClass::Fixed32,
        _ => ConnectionSizeClass::Variable,
    };
    let size_mask = if large { 0xFFFF } else { 0x3FFF };
    ((word & size_mask) as u16, size_class)
}

/// Parse a `Forward_Open`/`Large_Forward_Open` request payload, the
/// inverse of [`build_forward_open`] (§4.6).
pub fn parse_forward_open(payload: &[u8], large: bool, byte_order: Endianness) -> Result<ParsedForwardOpen> {
    let id_width = if large { 4 } else { 2 };
    let conn_param_width = if large { 4 } else { 2 };
    let header_len = 2 + 2 * id_width;
    let fixed_len = header_len + 2 + 2 + 4 + 4 + conn_param_width + 4 + conn_param_width + 1 + 1;
    if payload.len() < fixed_len {
        return Err(crate::error::ProtocolError::Truncated { expected: fixed_len, actual: payload.len() });
    }

    let priority_tick = payload[0];
    let timeout_ticks = payload[1];
    let mut pos = header_len;

    let serial = byte_order.read_u16(&payload[pos..pos + 2]);
    pos += 2 + 2 + 4; // conn_serial, vendor id, originator serial

    let o_to_t_rpi_us = byte_order.read_u32(&payload[pos..pos + 4]);
    pos += 4;
    let o_to_t_word = if large {
        byte_order.read_u32(&payload[pos..pos + 4])
    } else {
        u32::from(byte_order.read_u16(&payload[pos..pos + 2]))
    };
    pos += conn_param_width;
    let (o_to_t_size, size_class) = parse_connection_parameters(o_to_t_word, large);

    let t_to_o_rpi_us = byte_order.read_u32(&payload[pos..pos + 4]);
    pos += 4;
    let t_to_o_word = if large {
        byte_order.read_u32(&payload[pos..pos + 4])
    } else {
        u32::from(byte_order.read_u16(&payload[pos..pos + 2]))
    };
    pos += conn_param_width;
    let (t_to_o_size, _) = parse_connection_parameters(t_to_o_word, large);

    let transport_class_trigger = payload[pos];
    pos += 1;
    let path_words = payload[pos] as usize;
    pos += 1;
    let path_len = path_words * 2;
    if payload.len() < pos + path_len {
        return Err(crate::error::ProtocolError::Truncated { expected: pos + path_len, actual: payload.len() });
    }
    let (connection_path, _) = EPath::decode(&payload[pos..pos + path_len], Some(path_len))?;

    Ok(ParsedForwardOpen {
        params: ForwardOpenParams {
            priority_tick,
            timeout_ticks,
            o_to_t_rpi_us,
            t_to_o_rpi_us,
            o_to_t_size,
            t_to_o_size,
            size_class,
            transport_class_trigger,
            connection_path,
            large,
        },
        serial,
    })
}

/// Parameters to build a `Forward_Close` request (§4.6).
#[derive(Debug, Clone)]
pub struct ForwardCloseParams {
    /// Priority/time-tick byte.
    pub priority_tick: u8,
    /// Timeout ticks.
    pub timeout_ticks: u8,
    /// Connection serial number from the original `Forward_Open`.
    pub connection_serial: u16,
    /// Connection path.
    pub connection_path: EPath,
}

/// Build a `Forward_Close` payload.
#[must_use]
pub fn build_forward_close(params: &ForwardCloseParams, byte_order: Endianness) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(params.priority_tick);
    out.push(params.timeout_ticks);
    byte_order.put_u16(&mut out, params.connection_serial);
    out.extend_from_slice(&[0x00, 0x00]); // vendor id
    out.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // originator serial
    let path_bytes = params.connection_path.encode();
    out.push((path_bytes.len() / 2) as u8);
    out.push(0x00); // reserved
    out.extend_from_slice(&path_bytes);
    out
}

/// Parse a `Forward_Close` request's connection serial number, for
/// lookups against the connection registry.
pub fn parse_forward_close_serial(payload: &[u8], byte_order: Endianness) -> Result<u16> {
    if payload.len() < 4 {
        return Err(crate::error::ProtocolError::Truncated { expected: 4, actual: payload.len() });
    }
    Ok(byte_order.read_u16(&payload[2..4]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_open_success_meets_minimum_length() {
        let bytes = build_forward_open_success(0x1000_0000, 0x1000_0001, 1, 20_000, 20_000, Endianness::Little);
        assert!(bytes.len() >= FORWARD_OPEN_SUCCESS_MIN_LEN);
    }

    #[test]
    fn forward_open_success_round_trips() {
        let bytes = build_forward_open_success(0x1000_0000, 0x1000_0001, 0xBEEF, 20_000, 30_000, Endianness::Little);
        let parsed = parse_forward_open_success(&bytes, Endianness::Little).unwrap();
        assert_eq!(parsed.o_to_t_id, 0x1000_0000);
        assert_eq!(parsed.t_to_o_id, 0x1000_0001);
        assert_eq!(parsed.serial, 0xBEEF);
        assert_eq!(parsed.o_to_t_rpi_us, 20_000);
        assert_eq!(parsed.t_to_o_rpi_us, 30_000);
    }

    #[test]
    fn forward_open_success_round_trips_big_endian() {
        let bytes = build_forward_open_success(0x1000_0000, 0x1000_0001, 0xBEEF, 20_000, 30_000, Endianness::Big);
        let parsed = parse_forward_open_success(&bytes, Endianness::Big).unwrap();
        assert_eq!(parsed.o_to_t_id, 0x1000_0000);
        assert_eq!(parsed.t_to_o_id, 0x1000_0001);
        assert_eq!(parsed.serial, 0xBEEF);
        assert_eq!(parsed.o_to_t_rpi_us, 20_000);
        assert_eq!(parsed.t_to_o_rpi_us, 30_000);
    }

    #[test]
    fn forward_close_round_trips_serial() {
        let params = ForwardCloseParams {
            priority_tick: 0x03,
            timeout_ticks: 0xFA,
            connection_serial: 0xBEEF,
            connection_path: EPath::class_instance(0x06, 1),
        };
        let bytes = build_forward_close(&params, Endianness::Little);
        assert_eq!(parse_forward_close_serial(&bytes, Endianness::Little).unwrap(), 0xBEEF);
    }

    #[test]
    fn forward_close_round_trips_serial_big_endian() {
        let params = ForwardCloseParams {
            priority_tick: 0x03,
            timeout_ticks: 0xFA,
            connection_serial: 0xBEEF,
            connection_path: EPath::class_instance(0x06, 1),
        };
        let bytes = build_forward_close(&params, Endianness::Big);
        assert_eq!(parse_forward_close_serial(&bytes, Endianness::Big).unwrap(), 0xBEEF);
    }

    #[test]
    fn forward_open_request_round_trips() {
        let params = ForwardOpenParams {
            priority_tick: 0x03,
            timeout_ticks: 0xFA,
            o_to_t_rpi_us: 20_000,
            t_to_o_rpi_us: 20_000,
            o_to_t_size: 8,
            t_to_o_size: 8,
            size_class: ConnectionSizeClass::Fixed16,
            transport_class_trigger: 0xA3,
            connection_path: EPath::class_instance(0x04, 1),
            large: false,
        };
        let bytes = build_forward_open(&params, 0xBEEF, Endianness::Little);
        let parsed = parse_forward_open(&bytes, false, Endianness::Little).unwrap();
        assert_eq!(parsed.serial, 0xBEEF);
        assert_eq!(parsed.params.o_to_t_rpi_us, 20_000);
        assert_eq!(parsed.params.o_to_t_size, 8);
        assert_eq!(parsed.params.transport_class_trigger, 0xA3);
        assert_eq!(parsed.params.connection_path.class(), Some(0x04));
    }

    #[test]
    fn forward_open_request_round_trips_big_endian() {
        let params = ForwardOpenParams {
            priority_tick: 0x03,
            timeout_ticks: 0xFA,
            o_to_t_rpi_us: 20_000,
            t_to_o_rpi_us: 25_000,
            o_to_t_size: 8,
            t_to_o_size: 8,
            size_class: ConnectionSizeClass::Fixed16,
            transport_class_trigger: 0xA3,
            connection_path: EPath::class_instance(0x04, 1),
            large: false,
        };
        let bytes = build_forward_open(&params, 0xBEEF, Endianness::Big);
        let parsed = parse_forward_open(&bytes, false, Endianness::Big).unwrap();
        assert_eq!(parsed.serial, 0xBEEF);
        assert_eq!(parsed.params.o_to_t_rpi_us, 20_000);
        assert_eq!(parsed.params.t_to_o_rpi_us, 25_000);
        assert_eq!(parsed.params.o_to_t_size, 8);
        assert_eq!(parsed.params.transport_class_trigger, 0xA3);
        assert_eq!(parsed.params.connection_path.class(), Some(0x04));
    }

    #[test]
    fn large_forward_open_request_round_trips() {
        let params = ForwardOpenParams {
            priority_tick: 0x03,
            timeout_ticks: 0xFA,
            o_to_t_rpi_us: 20_000,
            t_to_o_rpi_us: 20_000,
            o_to_t_size: 4000,
            t_to_o_size: 4000,
            size_class: ConnectionSizeClass::Variable,
            transport_class_trigger: 0xA3,
            connection_path: EPath::class_instance(0x04, 1),
            large: true,
        };
        let bytes = build_forward_open(&params, 77, Endianness::Little);
        let parsed = parse_forward_open(&bytes, true, Endianness::Little).unwrap();
        assert_eq!(parsed.params.o_to_t_size, 4000);
        assert_eq!(parsed.params.size_class, ConnectionSizeClass::Variable);
    }

    #[test]
    fn large_forward_open_request_round_trips_big_endian() {
        let params = ForwardOpenParams {
            priority_tick: 0x03,
            timeout_ticks: 0xFA,
            o_to_t_rpi_us: 20_000,
            t_to_o_rpi_us: 20_000,
            o_to_t_size: 4000,
            t_to_o_size: 4000,
            size_class: ConnectionSizeClass::Variable,
            transport_class_trigger: 0xA3,
            connection_path: EPath::class_instance(0x04, 1),
            large: true,
        };
        let bytes = build_forward_open(&params, 77, Endianness::Big);
        let parsed = parse_forward_open(&bytes, true, Endianness::Big).unwrap();
        assert_eq!(parsed.params.o_to_t_size, 4000);
        assert_eq!(parsed.params.size_class, ConnectionSizeClass::Variable);
    }
}
