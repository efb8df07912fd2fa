//! Packet-record frame extraction and reference-packet comparison for the
//! CIP/ENIP test harness (C5, C15, §4.5/§4.15).
//!
//! This crate owns no live sockets and reads no capture files - it is the
//! interface a PCAP reader or a fault-injection harness hangs off of:
//! callers construct [`PacketRecord`]s from whatever capture source they
//! have and feed them to a [`FrameExtractor`], or compare two already-
//! decoded frame blobs with [`compare::frames_match`].

pub mod compare;
pub mod frame;
pub mod record;

pub use compare::{first_difference, frames_match, zero_session_id};
pub use frame::{Direction, ExtractedFrame, FrameExtractor};
pub use record::{PacketRecord, Transport};
