//! ENIP encapsulation and Common Packet Format (CPF) codec (C4).

use crate::{
    endian::Endianness,
    error::{ProtocolError, Result},
};

/// ENIP command codes (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// `0x0004` - list supported CIP services.
    ListServices,
    /// `0x0063` - discover devices.
    ListIdentity,
    /// `0x0064` - list available interfaces.
    ListInterfaces,
    /// `0x0065` - open a session.
    RegisterSession,
    /// `0x0066` - close a session.
    UnregisterSession,
    /// `0x006F` - unconnected explicit messaging.
    SendRRData,
    /// `0x0070` - connected (I/O) messaging.
    SendUnitData,
}

impl Command {
    /// Numeric command code.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::ListServices => 0x0004,
            Self::ListIdentity => 0x0063,
            Self::ListInterfaces => 0x0064,
            Self::RegisterSession => 0x0065,
            Self::UnregisterSession => 0x0066,
            Self::SendRRData => 0x006F,
            Self::SendUnitData => 0x0070,
        }
    }

    /// Look up a command by its numeric code.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0004 => Some(Self::ListServices),
            0x0063 => Some(Self::ListIdentity),
            0x0064 => Some(Self::ListInterfaces),
            0x0065 => Some(Self::RegisterSession),
            0x0066 => Some(Self::UnregisterSession),
            0x006F => Some(Self::SendRRData),
            0x0070 => Some(Self::SendUnitData),
            _ => None,
        }
    }
}

/// ENIP status codes (§6). Always compared/stored as u32 per §9's note on
/// the source's mismatched-width status constants.
pub mod status {
    /// Success.
    pub const SUCCESS: u32 = 0x0000_0000;
    /// Invalid/unsupported command.
    pub const INVALID_COMMAND: u32 = 0x0000_0001;
    /// Insufficient memory.
    pub const INSUFFICIENT_MEMORY: u32 = 0x0000_0002;
    /// Incorrect data in request.
    pub const INCORRECT_DATA: u32 = 0x0000_0003;
    /// Invalid session handle.
    pub const INVALID_SESSION_HANDLE: u32 = 0x0000_0064;
    /// Invalid length field.
    pub const INVALID_LENGTH: u32 = 0x0000_0065;
    /// Unsupported command (encapsulation-layer).
    pub const UNSUPPORTED_COMMAND: u32 = 0x0000_0066;
}

/// Fixed 24-byte ENIP encapsulation header plus its payload (§3, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encapsulation {
    /// Command code (kept raw so unknown-but-structurally-valid frames
    /// can still round-trip through the extractor).
    pub command: u16,
    /// Session handle (0 before RegisterSession succeeds).
    pub session_id: u32,
    /// Status code; see [`status`].
    pub status: u32,
    /// Opaque context echoed verbatim by the server.
    pub sender_context: [u8; 8],
    /// Option flags (reserved, must be zero under strict ODVA).
    pub options: u32,
    /// Command-specific payload.
    pub data: Vec<u8>,
}

impl Encapsulation {
    /// Header size on the wire.
    pub const HEADER_SIZE: usize = 24;

    /// Build a zero-session RegisterSession request (§4.4, §6).
    #[must_use]
    pub fn register_session_request(sender_context: [u8; 8]) -> Self {
        Self {
            command: Command::RegisterSession.code(),
            session_id: 0,
            status: status::SUCCESS,
            sender_context,
            options: 0,
            // protocol version (1) + option flags (0), both u16.
            data: vec![0x01, 0x00, 0x00, 0x00],
        }
    }

    /// Build a zero-session ListIdentity request (§4.4, §8 scenario 1).
    #[must_use]
    pub fn list_identity_request(sender_context: [u8; 8]) -> Self {
        Self {
            command: Command::ListIdentity.code(),
            session_id: 0,
            status: status::SUCCESS,
            sender_context,
            options: 0,
            data: Vec::new(),
        }
    }

    /// Build a zero-session ListServices request.
    #[must_use]
    pub fn list_services_request(sender_context: [u8; 8]) -> Self {
        Self {
            command: Command::ListServices.code(),
            session_id: 0,
            status: status::SUCCESS,
            sender_context,
            options: 0,
            data: Vec::new(),
        }
    }

    /// Build a zero-session ListInterfaces request.
    #[must_use]
    pub fn list_interfaces_request(sender_context: [u8; 8]) -> Self {
        Self {
            command: Command::ListInterfaces.code(),
            session_id: 0,
            status: status::SUCCESS,
            sender_context,
            options: 0,
            data: Vec::new(),
        }
    }

    /// Encode the header + data using `byte_order`. Per §4.4, `length` is
    /// always recomputed from `self.data.len()` regardless of any stored
    /// value - this is the defensive invariant §8 requires.
    #[must_use]
    pub fn encode(&self, byte_order: Endianness) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_SIZE + self.data.len());
        byte_order.put_u16(&mut out, self.command);
        byte_order.put_u16(&mut out, self.data.len() as u16);
        byte_order.put_u32(&mut out, self.session_id);
        byte_order.put_u32(&mut out, self.status);
        out.extend_from_slice(&self.sender_context);
        byte_order.put_u32(&mut out, self.options);
        out.extend_from_slice(&self.data);
        out
    }

    /// Decode a header + data from `buf` under `byte_order`.
    pub fn decode(buf: &[u8], byte_order: Endianness) -> Result<Self> {
        if buf.len() < Self::HEADER_SIZE {
            return Err(ProtocolError::Truncated { expected: Self::HEADER_SIZE, actual: buf.len() });
        }
        let command = byte_order.read_u16(&buf[0..2]);
        let length = byte_order.read_u16(&buf[2..4]) as usize;
        let session_id = byte_order.read_u32(&buf[4..8]);
        let status = byte_order.read_u32(&buf[8..12]);
        let mut sender_context = [0u8; 8];
        sender_context.copy_from_slice(&buf[12..20]);
        let options = byte_order.read_u32(&buf[20..24]);

        let total = Self::HEADER_SIZE + length;
        if buf.len() < total {
            return Err(ProtocolError::LengthMismatch { claimed: length, actual: buf.len() - Self::HEADER_SIZE });
        }
        let data = buf[Self::HEADER_SIZE..total].to_vec();

        Ok(Self { command, session_id, status, sender_context, options, data })
    }

    /// The wire `length` field value this encapsulation would produce.
    #[must_use]
    pub fn length(&self) -> u16 {
        self.data.len() as u16
    }
}

/// CPF item type IDs of interest (§3).
pub mod cpf_item {
    /// Null address item (used inside `SendRRData`).
    pub const NULL_ADDRESS: u16 = 0x0000;
    /// Connected address item: carries a 4-byte connection ID.
    pub const CONNECTED_ADDRESS: u16 = 0x00A1;
    /// Connected data item (used inside `SendUnitData`).
    pub const CONNECTED_DATA: u16 = 0x00B1;
    /// Unconnected data item (used inside `SendRRData`).
    pub const UNCONNECTED_DATA: u16 = 0x00B2;
    /// `ListIdentity` response item.
    pub const LIST_IDENTITY: u16 = 0x000C;
}

/// A single CPF item: `(type_id, data)`. Length is derived from `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpfItem {
    /// Item type ID (see [`cpf_item`]).
    pub type_id: u16,
    /// Item payload bytes.
    pub data: Vec<u8>,
}

impl CpfItem {
    /// A null-address item (zero-length, type `0x0000`).
    #[must_use]
    pub fn null_address() -> Self {
        Self { type_id: cpf_item::NULL_ADDRESS, data: Vec::new() }
    }

    /// A connected-address item carrying `connection_id`.
    #[must_use]
    pub fn connected_address(connection_id: u32, byte_order: Endianness) -> Self {
        let mut data = vec![0u8; 4];
        byte_order.write_u32(&mut data, connection_id);
        Self { type_id: cpf_item::CONNECTED_ADDRESS, data }
    }

    /// An unconnected-data item wrapping CIP request/response bytes.
    #[must_use]
    pub fn unconnected_data(cip_bytes: Vec<u8>) -> Self {
        Self { type_id: cpf_item::UNCONNECTED_DATA, data: cip_bytes }
    }

    /// A connected-data item wrapping an I/O payload (sequence word + data).
    #[must_use]
    pub fn connected_data(payload: Vec<u8>) -> Self {
        Self { type_id: cpf_item::CONNECTED_DATA, data: payload }
    }
}

/// Encode a CPF item list: `u16 count`, then `(type_id u16, length u16, data)*`.
#[must_use]
pub fn encode_cpf(items: &[CpfItem], byte_order: Endianness) -> Vec<u8> {
    let mut out = Vec::new();
    byte_order.put_u16(&mut out, items.len() as u16);
    for item in items {
        byte_order.put_u16(&mut out, item.type_id);
        byte_order.put_u16(&mut out, item.data.len() as u16);
        out.extend_from_slice(&item.data);
    }
    out
}

/// Decode a CPF item list.
pub fn decode_cpf(buf: &[u8], byte_order: Endianness) -> Result<(Vec<CpfItem>, usize)> {
    if buf.len() < 2 {
        return Err(ProtocolError::MalformedCpf { reason: "missing item count".to_string() });
    }
    let count = byte_order.read_u16(&buf[0..2]) as usize;
    let mut pos = 2;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.len() < pos + 4 {
            return Err(ProtocolError::MalformedCpf { reason: "truncated item header".to_string() });
        }
        let type_id = byte_order.read_u16(&buf[pos..pos + 2]);
        let len = byte_order.read_u16(&buf[pos + 2..pos + 4]) as usize;
        pos += 4;
        if buf.len() < pos + len {
            return Err(ProtocolError::MalformedCpf { reason: "truncated item data".to_string() });
        }
        items.push(CpfItem { type_id, data: buf[pos..pos + len].to_vec() });
        pos += len;
    }
    Ok((items, pos))
}

/// Build the `SendRRData` encapsulation payload (§4.4): `interface_handle
/// u32 = 0 | timeout u16 | (CPF items if `use_cpf` else raw cip data)`.
#[must_use]
pub fn build_send_rr_data(cip_bytes: Vec<u8>, timeout: u16, use_cpf: bool, byte_order: Endianness) -> Vec<u8> {
    let mut out = Vec::new();
    byte_order.put_u32(&mut out, 0); // interface handle
    byte_order.put_u16(&mut out, timeout);
    if use_cpf {
        let items = vec![CpfItem::null_address(), CpfItem::unconnected_data(cip_bytes)];
        out.extend_from_slice(&encode_cpf(&items, byte_order));
    } else {
        out.extend_from_slice(&cip_bytes);
    }
    out
}

/// Parse a `SendRRData` payload, returning the embedded CIP bytes. When
/// `use_cpf`, requires exactly one null-address item and one
/// unconnected-data item in that order (§8's invariant).
pub fn parse_send_rr_data(buf: &[u8], use_cpf: bool, byte_order: Endianness) -> Result<Vec<u8>> {
    if buf.len() < 6 {
        return Err(ProtocolError::Truncated { expected: 6, actual: buf.len() });
    }
    let rest = &buf[6..];
    if !use_cpf {
        return Ok(rest.to_vec());
    }
    let (items, _) = decode_cpf(rest, byte_order)?;
    if items.len() != 2
        || items[0].type_id != cpf_item::NULL_ADDRESS
        || items[1].type_id != cpf_item::UNCONNECTED_DATA
    {
        return Err(ProtocolError::MalformedCpf {
            reason: "expected exactly [null-address, unconnected-data]".to_string(),
        });
    }
    Ok(items[1].data.clone())
}

/// Build the `SendUnitData` encapsulation payload (§4.4).
#[must_use]
pub fn build_send_unit_data(
    connection_id: u32,
    cip_bytes: Vec<u8>,
    use_cpf: bool,
    byte_order: Endianness,
) -> Vec<u8> {
    let mut out = Vec::new();
    if use_cpf {
        byte_order.put_u32(&mut out, 0); // interface handle
        byte_order.put_u16(&mut out, 0); // timeout
        let items =
            vec![CpfItem::connected_address(connection_id, byte_order), CpfItem::connected_data(cip_bytes)];
        out.extend_from_slice(&encode_cpf(&items, byte_order));
    } else {
        byte_order.put_u32(&mut out, connection_id);
        out.extend_from_slice(&cip_bytes);
    }
    out
}

/// Parse a `SendUnitData` payload, returning `(connection_id, cip_bytes)`.
pub fn parse_send_unit_data(buf: &[u8], use_cpf: bool, byte_order: Endianness) -> Result<(u32, Vec<u8>)> {
    if use_cpf {
        if buf.len() < 6 {
            return Err(ProtocolError::Truncated { expected: 6, actual: buf.len() });
        }
        let (items, _) = decode_cpf(&buf[6..], byte_order)?;
        let addr_item = items
            .iter()
            .find(|i| i.type_id == cpf_item::CONNECTED_ADDRESS)
            .ok_or_else(|| ProtocolError::MalformedCpf {
                reason: "missing connected-address item".to_string(),
            })?;
        let data_item = items
            .iter()
            .find(|i| i.type_id == cpf_item::CONNECTED_DATA)
            .ok_or_else(|| ProtocolError::MalformedCpf { reason: "missing connected-data item".to_string() })?;
        if addr_item.data.len() < 4 {
            return Err(ProtocolError::MalformedCpf {
                reason: "connected-address item too short".to_string(),
            });
        }
        let connection_id = byte_order.read_u32(&addr_item.data);
        Ok((connection_id, data_item.data.clone()))
    } else {
        if buf.len() < 4 {
            return Err(ProtocolError::Truncated { expected: 4, actual: buf.len() });
        }
        let connection_id = byte_order.read_u32(&buf[0..4]);
        Ok((connection_id, buf[4..].to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn list_identity_round_trip_matches_scenario_1() {
        let ctx = [1, 2, 3, 4, 5, 6, 7, 8];
        let req = Encapsulation::list_identity_request(ctx);
        assert_eq!(req.command, Command::ListIdentity.code());
        assert_eq!(req.length(), 0);
        assert_eq!(req.session_id, 0);
        assert_eq!(req.status, 0);
        let bytes = req.encode(Endianness::Little);
        let decoded = Encapsulation::decode(&bytes, Endianness::Little).unwrap();
        assert_eq!(decoded.sender_context, ctx);
        assert_eq!(decoded.command, Command::ListIdentity.code());
    }

    #[test]
    fn length_is_always_recomputed_on_encode() {
        let enc = Encapsulation {
            command: Command::SendRRData.code(),
            session_id: 7,
            status: 0,
            sender_context: [0; 8],
            options: 0,
            data: vec![1, 2, 3],
        };
        let bytes = enc.encode(Endianness::Little);
        let decoded = Encapsulation::decode(&bytes, Endianness::Little).unwrap();
        assert_eq!(decoded.length() as usize, decoded.data.len());
    }

    #[test]
    fn send_rr_data_with_cpf_has_exactly_null_then_unconnected() {
        let bytes = build_send_rr_data(vec![0x0E, 0x01], 5, true, Endianness::Little);
        let (items, _) = decode_cpf(&bytes[6..], Endianness::Little).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].type_id, cpf_item::NULL_ADDRESS);
        assert_eq!(items[1].type_id, cpf_item::UNCONNECTED_DATA);
        let recovered = parse_send_rr_data(&bytes, true, Endianness::Little).unwrap();
        assert_eq!(recovered, vec![0x0E, 0x01]);
    }

    #[test]
    fn send_unit_data_round_trips_without_cpf() {
        let bytes = build_send_unit_data(0xAABBCCDD, vec![9, 9], false, Endianness::Little);
        let (conn_id, cip) = parse_send_unit_data(&bytes, false, Endianness::Little).unwrap();
        assert_eq!(conn_id, 0xAABBCCDD);
        assert_eq!(cip, vec![9, 9]);
    }

    proptest! {
        #[test]
        fn encapsulation_round_trips(
            command in any::<u16>(),
            session_id in any::<u32>(),
            status in any::<u32>(),
            ctx in proptest::collection::vec(any::<u8>(), 8..=8),
            data in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut sender_context = [0u8; 8];
            sender_context.copy_from_slice(&ctx);
            let enc = Encapsulation { command, session_id, status, sender_context, options: 0, data };
            let bytes = enc.encode(Endianness::Little);
            let decoded = Encapsulation::decode(&bytes, Endianness::Little).unwrap();
            prop_assert_eq!(decoded.length() as usize, decoded.data.len());
            prop_assert_eq!(decoded, enc);
        }
    }
}
