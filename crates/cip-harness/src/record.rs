//! Packet-record ingestion types (C5, §4.5).
//!
//! [`PacketRecord`] is the only contract between this crate and whatever
//! reads the underlying capture format - a `.pcap`/`.pcapng` reader (an
//! external collaborator, per §5's non-goals) constructs these and feeds
//! them to a [`crate::frame::FrameExtractor`] in arbitrary order; the
//! extractor itself never touches a capture file.

use std::{net::SocketAddr, time::Duration};

/// Transport a [`PacketRecord`] rode in on (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// TCP - subject to per-5-tuple reassembly.
    Tcp,
    /// UDP - each datagram is a complete frame on its own.
    Udp,
}

/// One captured packet's transport-layer payload and addressing, the unit
/// [`crate::frame::FrameExtractor::push`] consumes (§4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct PacketRecord {
    /// Transport this packet rode in on.
    pub transport: Transport,
    /// Source socket address.
    pub src: SocketAddr,
    /// Destination socket address.
    pub dst: SocketAddr,
    /// Transport-layer payload bytes (no IP/Ethernet headers).
    pub payload: Vec<u8>,
    /// Capture timestamp, time since some reference epoch - `None` when
    /// the source capture didn't carry one (mirrors `pcarp::Packet`'s
    /// optional timestamp).
    pub timestamp: Option<Duration>,
}

impl PacketRecord {
    /// Construct a record with no timestamp, for synthetic test fixtures
    /// and callers that don't have wall-clock capture metadata.
    #[must_use]
    pub fn new(transport: Transport, src: SocketAddr, dst: SocketAddr, payload: Vec<u8>) -> Self {
        Self { transport, src, dst, payload, timestamp: None }
    }

    /// True if either endpoint is one of the well-known CIP/ENIP ports
    /// (44818 explicit messaging/discovery, 2222 implicit I/O) - the only
    /// packets [`crate::frame::FrameExtractor`] considers (§4.5).
    #[must_use]
    pub fn touches_known_port(&self) -> bool {
        const EXPLICIT_MESSAGING_PORT: u16 = 44818;
        const IMPLICIT_IO_PORT: u16 = 2222;
        [self.src.port(), self.dst.port()]
            .iter()
            .any(|p| *p == EXPLICIT_MESSAGING_PORT || *p == IMPLICIT_IO_PORT)
    }

    /// True if this packet flows toward the well-known port (i.e. client
    /// to server) rather than away from it.
    #[must_use]
    pub fn is_to_server(&self) -> bool {
        const EXPLICIT_MESSAGING_PORT: u16 = 44818;
        const IMPLICIT_IO_PORT: u16 = 2222;
        matches!(self.dst.port(), EXPLICIT_MESSAGING_PORT | IMPLICIT_IO_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn touches_known_port_checks_both_endpoints() {
        let p = PacketRecord::new(Transport::Tcp, addr(51000), addr(44818), vec![]);
        assert!(p.touches_known_port());
        let q = PacketRecord::new(Transport::Tcp, addr(51000), addr(9999), vec![]);
        assert!(!q.touches_known_port());
    }

    #[test]
    fn direction_is_inferred_from_destination_port() {
        let request = PacketRecord::new(Transport::Tcp, addr(51000), addr(44818), vec![]);
        assert!(request.is_to_server());
        let response = PacketRecord::new(Transport::Tcp, addr(44818), addr(51000), vec![]);
        assert!(!response.is_to_server());
    }
}
