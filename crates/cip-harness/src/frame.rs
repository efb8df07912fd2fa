//! Frame extractor: packet records in, parsed ENIP frames out (C5, §4.5).
//!
//! ```text
//! BUFFER ──(>=24 bytes)──> HAVE_HEADER ──(>=24+length bytes)──> HAVE_FRAME ──> emit
//!    ^                          │
//!    └──── resync +1 byte <─────┘   (header decodes under neither endian)
//! ```
//!
//! TCP streams are reassembled independently per `(src, dst)` pair - each
//! direction of a connection is its own 5-tuple and gets its own rolling
//! buffer, since sequence numbers (and therefore frame boundaries) are
//! per-direction. UDP datagrams never touch the buffer map: each one is a
//! complete frame or it's dropped.

use std::{collections::HashMap, net::SocketAddr, time::Duration};

use cip_proto::{
    endian::Endianness,
    enip::{Command, Encapsulation, cpf_item, decode_cpf},
};

use crate::record::{PacketRecord, Transport};

/// Request/response judgment the extractor attaches to a frame (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Inferred to flow from originator to target.
    Request,
    /// Inferred to flow from target to originator.
    Response,
    /// The command carries no direction-inference rule (§4.5 only defines
    /// rules for `RegisterSession`, `ListIdentity`, `SendRRData`, and
    /// `SendUnitData`); everything else is left unjudged rather than
    /// guessed at.
    Unknown,
}

/// One fully reassembled ENIP frame, with the extractor's direction
/// judgment attached (§4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFrame {
    /// Transport the frame arrived over.
    pub transport: Transport,
    /// Source address of the packet(s) this frame was extracted from.
    pub src: SocketAddr,
    /// Destination address of the packet(s) this frame was extracted from.
    pub dst: SocketAddr,
    /// Byte order the header decoded under (dual-endian trial-decode).
    pub byte_order: Endianness,
    /// Parsed encapsulation header and payload.
    pub encapsulation: Encapsulation,
    /// The full frame bytes (header + payload) as they appeared on the wire.
    pub raw: Vec<u8>,
    /// Inferred request/response direction.
    pub direction: Direction,
    /// Capture timestamp of the packet that completed this frame, if known.
    pub timestamp: Option<Duration>,
}

/// Try the front of `buf` as an ENIP header under little-endian first,
/// then big-endian (§4.5's dual-endian trial-decode), accepting the first
/// candidate whose command code matches a known [`Command`]. The claimed
/// length is a `u16` so it's always representable - there is no separate
/// "satisfiable" bound beyond the command match itself.
///
/// Returns `(byte_order, total_frame_len)` on success.
fn trial_decode_front(buf: &[u8]) -> Option<(Endianness, usize)> {
    if buf.len() < Encapsulation::HEADER_SIZE {
        return None;
    }
    for byte_order in [Endianness::Little, Endianness::Big] {
        let command = byte_order.read_u16(&buf[0..2]);
        if Command::from_code(command).is_none() {
            continue;
        }
        let length = byte_order.read_u16(&buf[2..4]) as usize;
        return Some((byte_order, Encapsulation::HEADER_SIZE + length));
    }
    None
}

/// Recover the leading CIP service byte from a `SendRRData`/`SendUnitData`
/// payload, peeking through CPF framing when present and falling back to
/// the raw (non-CPF) layout otherwise (§4.5).
fn cip_service_byte(command: Command, data: &[u8], byte_order: Endianness) -> Option<u8> {
    match command {
        Command::SendRRData => {
            let rest = data.get(6..)?;
            if let Ok((items, _)) = decode_cpf(rest, byte_order) {
                if let Some(item) = items.iter().find(|i| i.type_id == cpf_item::UNCONNECTED_DATA) {
                    return item.data.first().copied();
                }
            }
            rest.first().copied()
        },
        Command::SendUnitData => {
            if let Some(rest) = data.get(6..) {
                if let Ok((items, _)) = decode_cpf(rest, byte_order) {
                    if let Some(item) = items.iter().find(|i| i.type_id == cpf_item::CONNECTED_DATA) {
                        return item.data.first().copied();
                    }
                }
            }
            data.get(4).copied()
        },
        _ => None,
    }
}

/// Apply §4.5's direction-inference rules for the commands it names;
/// everything else comes back [`Direction::Unknown`].
fn infer_direction(record: &PacketRecord, enc: &Encapsulation, byte_order: Endianness) -> Direction {
    match Command::from_code(enc.command) {
        Some(Command::RegisterSession) => {
            if enc.session_id == 0 && enc.status == 0 { Direction::Request } else { Direction::Response }
        },
        Some(Command::ListIdentity) => {
            if record.is_to_server() { Direction::Request } else { Direction::Response }
        },
        Some(command @ (Command::SendRRData | Command::SendUnitData)) => {
            match cip_service_byte(command, &enc.data, byte_order) {
                Some(service) if service & 0x80 != 0 => Direction::Response,
                Some(_) => Direction::Request,
                None => Direction::Unknown,
            }
        },
        _ => Direction::Unknown,
    }
}

/// Reassembles ENIP frames out of arbitrary-order [`PacketRecord`]s (C5).
///
/// One extractor tracks every TCP stream it has seen packets for; UDP
/// datagrams pass through without retained state. Feed packets via
/// [`Self::push`] in whatever order the capture delivers them - frames
/// only emerge once their bytes are complete, but out-of-order *packets*
/// within a stream are not reordered (matching §5's "no reordering or
/// dedup" rule for the live transport this mirrors).
#[derive(Debug, Default)]
pub struct FrameExtractor {
    streams: HashMap<(SocketAddr, SocketAddr), Vec<u8>>,
}

impl FrameExtractor {
    /// A fresh extractor with no retained stream state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet record, returning every ENIP frame it completed.
    /// Packets not touching ports 44818/2222 are ignored (§4.5).
    pub fn push(&mut self, record: &PacketRecord) -> Vec<ExtractedFrame> {
        if !record.touches_known_port() {
            return Vec::new();
        }
        match record.transport {
            Transport::Udp => self.extract_datagram(record).into_iter().collect(),
            Transport::Tcp => self.extract_stream(record),
        }
    }

    fn extract_datagram(&self, record: &PacketRecord) -> Option<ExtractedFrame> {
        let (byte_order, total) = trial_decode_front(&record.payload)?;
        if record.payload.len() < total {
            return None;
        }
        let enc = Encapsulation::decode(&record.payload[..total], byte_order).ok()?;
        let direction = infer_direction(record, &enc, byte_order);
        Some(ExtractedFrame {
            transport: Transport::Udp,
            src: record.src,
            dst: record.dst,
            byte_order,
            direction,
            raw: record.payload[..total].to_vec(),
            encapsulation: enc,
            timestamp: record.timestamp,
        })
    }

    fn extract_stream(&mut self, record: &PacketRecord) -> Vec<ExtractedFrame> {
        let buf = self.streams.entry((record.src, record.dst)).or_default();
        buf.extend_from_slice(&record.payload);

        let mut frames = Vec::new();
        loop {
            if buf.len() < Encapsulation::HEADER_SIZE {
                break;
            }
            let Some((byte_order, total)) = trial_decode_front(buf) else {
                // Corrupt header under both endians: resync by one byte
                // rather than discarding the whole buffer (§9).
                buf.drain(..1);
                continue;
            };
            if buf.len() < total {
                break; // HAVE_HEADER: wait for the rest of the frame.
            }
            let frame_bytes: Vec<u8> = buf.drain(..total).collect();
            let Ok(enc) = Encapsulation::decode(&frame_bytes, byte_order) else {
                continue;
            };
            let direction = infer_direction(record, &enc, byte_order);
            frames.push(ExtractedFrame {
                transport: Transport::Tcp,
                src: record.src,
                dst: record.dst,
                byte_order,
                direction,
                raw: frame_bytes,
                encapsulation: enc,
                timestamp: record.timestamp,
            });
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use cip_proto::enip::status;

    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn udp_register_session_request_is_a_single_frame() {
        let mut extractor = FrameExtractor::new();
        let req = Encapsulation::register_session_request([1; 8]);
        let record =
            PacketRecord::new(Transport::Udp, addr(51000), addr(44818), req.encode(Endianness::Little));
        let frames = extractor.push(&record);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].direction, Direction::Request);
        assert_eq!(frames[0].byte_order, Endianness::Little);
    }

    #[test]
    fn register_session_response_has_nonzero_session_id() {
        let mut extractor = FrameExtractor::new();
        let resp = Encapsulation {
            command: Command::RegisterSession.code(),
            session_id: 42,
            status: status::SUCCESS,
            sender_context: [1; 8],
            options: 0,
            data: vec![0x01, 0x00, 0x00, 0x00],
        };
        let record =
            PacketRecord::new(Transport::Udp, addr(44818), addr(51000), resp.encode(Endianness::Little));
        let frames = extractor.push(&record);
        assert_eq!(frames[0].direction, Direction::Response);
    }

    #[test]
    fn big_endian_header_is_detected_as_a_fallback() {
        let mut extractor = FrameExtractor::new();
        let req = Encapsulation::list_identity_request([9; 8]);
        let record =
            PacketRecord::new(Transport::Udp, addr(51000), addr(44818), req.encode(Endianness::Big));
        let frames = extractor.push(&record);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].byte_order, Endianness::Big);
        assert_eq!(frames[0].direction, Direction::Request);
    }

    #[test]
    fn tcp_frame_split_across_two_packets_is_reassembled() {
        let mut extractor = FrameExtractor::new();
        let req = Encapsulation::register_session_request([2; 8]);
        let bytes = req.encode(Endianness::Little);
        let midpoint = 10;

        let first = PacketRecord::new(Transport::Tcp, addr(51000), addr(44818), bytes[..midpoint].to_vec());
        assert!(extractor.push(&first).is_empty());

        let second = PacketRecord::new(Transport::Tcp, addr(51000), addr(44818), bytes[midpoint..].to_vec());
        let frames = extractor.push(&second);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].encapsulation.sender_context, [2; 8]);
    }

    #[test]
    fn two_frames_back_to_back_in_one_packet_both_emerge() {
        let mut extractor = FrameExtractor::new();
        let a = Encapsulation::list_identity_request([1; 8]).encode(Endianness::Little);
        let b = Encapsulation::list_identity_request([2; 8]).encode(Endianness::Little);
        let mut combined = a;
        combined.extend_from_slice(&b);

        let record = PacketRecord::new(Transport::Tcp, addr(51000), addr(44818), combined);
        let frames = extractor.push(&record);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].encapsulation.sender_context, [1; 8]);
        assert_eq!(frames[1].encapsulation.sender_context, [2; 8]);
    }

    #[test]
    fn corrupt_leading_byte_is_skipped_and_the_frame_still_emerges() {
        let mut extractor = FrameExtractor::new();
        let frame = Encapsulation::list_identity_request([3; 8]).encode(Endianness::Little);
        let mut corrupted = vec![0xFF];
        corrupted.extend_from_slice(&frame);

        let record = PacketRecord::new(Transport::Tcp, addr(51000), addr(44818), corrupted);
        let frames = extractor.push(&record);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].encapsulation.sender_context, [3; 8]);
    }

    #[test]
    fn packets_on_unrelated_ports_are_ignored() {
        let mut extractor = FrameExtractor::new();
        let record = PacketRecord::new(Transport::Tcp, addr(51000), addr(8080), vec![0u8; 64]);
        assert!(extractor.push(&record).is_empty());
    }

    #[test]
    fn each_direction_of_a_tcp_connection_reassembles_independently() {
        let mut extractor = FrameExtractor::new();
        let request = Encapsulation::register_session_request([4; 8]).encode(Endianness::Little);
        let response_frame = Encapsulation {
            command: Command::RegisterSession.code(),
            session_id: 7,
            status: status::SUCCESS,
            sender_context: [4; 8],
            options: 0,
            data: vec![0x01, 0x00, 0x00, 0x00],
        };
        let response = response_frame.encode(Endianness::Little);

        let client_to_server = PacketRecord::new(Transport::Tcp, addr(51000), addr(44818), request);
        let server_to_client = PacketRecord::new(Transport::Tcp, addr(44818), addr(51000), response);

        let from_client = extractor.push(&client_to_server);
        let from_server = extractor.push(&server_to_client);
        assert_eq!(from_client.len(), 1);
        assert_eq!(from_server.len(), 1);
        assert_eq!(from_client[0].direction, Direction::Request);
        assert_eq!(from_server[0].direction, Direction::Response);
    }
}
