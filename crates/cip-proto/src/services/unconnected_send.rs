//! `Unconnected_Send` payload builder/parser (C6).

use crate::{
    epath::EPath,
    error::{ProtocolError, Result},
};

/// Parameters for an `Unconnected_Send` request (§4.6).
#[derive(Debug, Clone)]
pub struct UnconnectedSendParams {
    /// Priority/time-tick byte.
    pub priority_tick: u8,
    /// Timeout ticks.
    pub timeout_ticks: u8,
    /// Fully encoded embedded CIP request bytes.
    pub embedded_message: Vec<u8>,
    /// Route path to the target device.
    pub route_path: EPath,
}

/// Build an `Unconnected_Send` payload: `priority | timeout |
/// embedded_size u16 | embedded_message | route_path_words | route_path`.
#[must_use]
pub fn build_unconnected_send(params: &UnconnectedSendParams) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(params.priority_tick);
    out.push(params.timeout_ticks);
    out.extend_from_slice(&(params.embedded_message.len() as u16).to_le_bytes());
    out.extend_from_slice(&params.embedded_message);
    if params.embedded_message.len() % 2 != 0 {
        out.push(0x00); // pad embedded message to even length before route path
    }
    let route_bytes = params.route_path.encode();
    out.push((route_bytes.len() / 2) as u8);
    out.push(0x00); // reserved
    out.extend_from_slice(&route_bytes);
    out
}

/// Parsed view of an `Unconnected_Send` request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUnconnectedSend {
    /// Priority/time-tick byte.
    pub priority_tick: u8,
    /// Timeout ticks.
    pub timeout_ticks: u8,
    /// Embedded CIP request bytes.
    pub embedded_message: Vec<u8>,
    /// Route path.
    pub route_path: EPath,
}

/// Parse an `Unconnected_Send` payload.
pub fn parse_unconnected_send(buf: &[u8]) -> Result<ParsedUnconnectedSend> {
    if buf.len() < 4 {
        return Err(ProtocolError::Truncated { expected: 4, actual: buf.len() });
    }
    let priority_tick = buf[0];
    let timeout_ticks = buf[1];
    let embedded_len = u16::from_le_bytes([buf[2], buf[3]]) as usize;
    let mut pos = 4;
    if buf.len() < pos + embedded_len {
        return Err(ProtocolError::Truncated { expected: pos + embedded_len, actual: buf.len() });
    }
    let embedded_message = buf[pos..pos + embedded_len].to_vec();
    pos += embedded_len;
    if embedded_len % 2 != 0 {
        pos += 1; // skip pad byte
    }

    let route_words =
        *buf.get(pos).ok_or(ProtocolError::Truncated { expected: pos + 1, actual: buf.len() })? as usize;
    pos += 2; // route-path-word-count byte + reserved byte
    let route_len = route_words * 2;
    if buf.len() < pos + route_len {
        return Err(ProtocolError::Truncated { expected: pos + route_len, actual: buf.len() });
    }
    let (route_path, _) = EPath::decode(&buf[pos..pos + route_len], Some(route_len))?;

    Ok(ParsedUnconnectedSend { priority_tick, timeout_ticks, embedded_message, route_path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_embedded_message_and_route_path() {
        let params = UnconnectedSendParams {
            priority_tick: 0x05,
            timeout_ticks: 0x0A,
            embedded_message: vec![0x0E, 0x03, 0x20, 0x01, 0x24, 0x01, 0x30, 0x01],
            route_path: EPath::class_instance(0x06, 1),
        };
        let bytes = build_unconnected_send(&params);
        let parsed = parse_unconnected_send(&bytes).unwrap();
        assert_eq!(parsed.embedded_message, params.embedded_message);
        assert_eq!(parsed.route_path, params.route_path);
    }

    #[test]
    fn odd_length_embedded_message_is_padded() {
        let params = UnconnectedSendParams {
            priority_tick: 0,
            timeout_ticks: 0,
            embedded_message: vec![1, 2, 3],
            route_path: EPath::class_instance(0x06, 1),
        };
        let bytes = build_unconnected_send(&params);
        let parsed = parse_unconnected_send(&bytes).unwrap();
        assert_eq!(parsed.embedded_message, vec![1, 2, 3]);
    }
}
