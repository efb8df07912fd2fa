//! `ListIdentity` response identity item (§8 scenario 1, §6, §9).
//!
//! ODVA places Vendor ID/Product Code/Serial Number inside the CPF
//! identity item, which is otherwise little-endian; per §9's open
//! question this harness reads those three subfields little-endian too
//! rather than picking up the source's inconsistent big-endian path -
//! see DESIGN.md.

use crate::{
    endian::Endianness,
    enip::{CpfItem, cpf_item, decode_cpf, encode_cpf},
    error::{ProtocolError, Result},
};

/// Socket address embedded in the identity item (ODVA Vol 2 §2-4.3):
/// always a 16-byte `sockaddr_in`-shaped structure, big-endian per the
/// BSD socket convention this one field keeps regardless of `byte_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketAddress {
    /// Address family (`2` for `AF_INET`).
    pub family: i16,
    /// Port, host byte order on the wire (big-endian).
    pub port: u16,
    /// IPv4 address, network byte order.
    pub address: [u8; 4],
}

impl SocketAddress {
    const ENCODED_LEN: usize = 16;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.family.to_be_bytes());
        out.extend_from_slice(&self.port.to_be_bytes());
        out.extend_from_slice(&self.address);
        out.extend_from_slice(&[0u8; 8]);
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::ENCODED_LEN {
            return Err(ProtocolError::Truncated { expected: Self::ENCODED_LEN, actual: buf.len() });
        }
        let family = i16::from_be_bytes([buf[0], buf[1]]);
        let port = u16::from_be_bytes([buf[2], buf[3]]);
        let address = [buf[4], buf[5], buf[6], buf[7]];
        Ok(Self { family, port, address })
    }
}

/// `ListIdentity` identity item contents (§8 scenario 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityItem {
    /// Encapsulation protocol version the device supports.
    pub protocol_version: u16,
    /// Device's own address, as it reports it.
    pub socket_address: SocketAddress,
    /// Vendor ID.
    pub vendor_id: u16,
    /// Device type code.
    pub device_type: u16,
    /// Product code.
    pub product_code: u16,
    /// `(major, minor)` revision.
    pub revision: (u8, u8),
    /// Device status word.
    pub status: u16,
    /// Serial number.
    pub serial_number: u32,
    /// Product name (CIP `SHORT_STRING`: one-byte length prefix).
    pub product_name: String,
    /// Device state byte.
    pub state: u8,
}

impl IdentityItem {
    /// Encode the identity item body. The `sockaddr`, protocol version,
    /// device type, revision, and status fields follow `byte_order` like
    /// everything else in CPF; vendor_id/product_code/serial_number are
    /// always little-endian per this harness's documented reading of the
    /// open ambiguity (§9, DESIGN.md).
    #[must_use]
    pub fn encode(&self, byte_order: Endianness) -> Vec<u8> {
        let mut out = Vec::new();
        byte_order.put_u16(&mut out, self.protocol_version);
        self.socket_address.encode(&mut out);
        Endianness::Little.put_u16(&mut out, self.vendor_id);
        byte_order.put_u16(&mut out, self.device_type);
        Endianness::Little.put_u16(&mut out, self.product_code);
        out.push(self.revision.0);
        out.push(self.revision.1);
        byte_order.put_u16(&mut out, self.status);
        Endianness::Little.put_u32(&mut out, self.serial_number);
        let name_bytes = self.product_name.as_bytes();
        out.push(name_bytes.len() as u8);
        out.extend_from_slice(name_bytes);
        out.push(self.state);
        out
    }

    /// Decode an identity item body, the inverse of [`Self::encode`].
    pub fn decode(buf: &[u8], byte_order: Endianness) -> Result<Self> {
        let mut pos = 0;
        let need = |pos: usize, len: usize| -> Result<()> {
            if buf.len() < pos + len {
                Err(ProtocolError::Truncated { expected: pos + len, actual: buf.len() })
            } else {
                Ok(())
            }
        };

        need(pos, 2)?;
        let protocol_version = byte_order.read_u16(&buf[pos..pos + 2]);
        pos += 2;

        let socket_address = SocketAddress::decode(&buf[pos..])?;
        pos += SocketAddress::ENCODED_LEN;

        need(pos, 2)?;
        let vendor_id = Endianness::Little.read_u16(&buf[pos..pos + 2]);
        pos += 2;

        need(pos, 2)?;
        let device_type = byte_order.read_u16(&buf[pos..pos + 2]);
        pos += 2;

        need(pos, 2)?;
        let product_code = Endianness::Little.read_u16(&buf[pos..pos + 2]);
        pos += 2;

        need(pos, 2)?;
        let revision = (buf[pos], buf[pos + 1]);
        pos += 2;

        need(pos, 2)?;
        let status = byte_order.read_u16(&buf[pos..pos + 2]);
        pos += 2;

        need(pos, 4)?;
        let serial_number = Endianness::Little.read_u32(&buf[pos..pos + 4]);
        pos += 4;

        need(pos, 1)?;
        let name_len = buf[pos] as usize;
        pos += 1;
        need(pos, name_len)?;
        let product_name = String::from_utf8_lossy(&buf[pos..pos + name_len]).into_owned();
        pos += name_len;

        need(pos, 1)?;
        let state = buf[pos];

        Ok(Self {
            protocol_version,
            socket_address,
            vendor_id,
            device_type,
            product_code,
            revision,
            status,
            serial_number,
            product_name,
            state,
        })
    }
}

/// Build a `ListIdentity` response's CPF-encoded data payload: one
/// [`cpf_item::LIST_IDENTITY`] item per reported identity (§6, §8
/// scenario 1).
#[must_use]
pub fn build_list_identity_response(identities: &[IdentityItem], byte_order: Endianness) -> Vec<u8> {
    let items: Vec<CpfItem> = identities
        .iter()
        .map(|identity| CpfItem { type_id: cpf_item::LIST_IDENTITY, data: identity.encode(byte_order) })
        .collect();
    encode_cpf(&items, byte_order)
}

/// Parse a `ListIdentity` response's CPF-encoded data payload, returning
/// every `LIST_IDENTITY` item found (§8 scenario 1).
pub fn parse_list_identity_response(data: &[u8], byte_order: Endianness) -> Result<Vec<IdentityItem>> {
    let (items, _) = decode_cpf(data, byte_order)?;
    items
        .iter()
        .filter(|item| item.type_id == cpf_item::LIST_IDENTITY)
        .map(|item| IdentityItem::decode(&item.data, byte_order))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IdentityItem {
        IdentityItem {
            protocol_version: 1,
            socket_address: SocketAddress { family: 2, port: 44818, address: [10, 0, 0, 5] },
            vendor_id: 0x0001,
            device_type: 0x0C,
            product_code: 100,
            revision: (1, 0),
            status: 0,
            serial_number: 12345,
            product_name: "Test Device".to_string(),
            state: 0,
        }
    }

    #[test]
    fn identity_item_round_trips_scenario_1_fields() {
        let item = sample();
        let bytes = item.encode(Endianness::Little);
        let decoded = IdentityItem::decode(&bytes, Endianness::Little).unwrap();
        assert_eq!(decoded.vendor_id, 0x0001);
        assert_eq!(decoded.product_code, 100);
        assert_eq!(decoded.serial_number, 12345);
        assert_eq!(decoded.product_name, "Test Device");
        assert_eq!(decoded.state, 0);
    }

    #[test]
    fn vendor_product_serial_stay_little_endian_under_big_endian_profile() {
        let item = sample();
        let bytes = item.encode(Endianness::Big);
        let decoded = IdentityItem::decode(&bytes, Endianness::Big).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn list_identity_response_round_trips_through_cpf() {
        let data = build_list_identity_response(&[sample()], Endianness::Little);
        let parsed = parse_list_identity_response(&data, Endianness::Little).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].product_name, "Test Device");
    }
}
