//! Wire codec for CIP (Common Industrial Protocol) over ENIP
//! (EtherNet/IP): byte order, EPATH segments, CIP requests/responses,
//! ENIP encapsulation headers, and the Common Packet Format.
//!
//! This crate has no notion of sessions, connections, or device
//! personalities - it only knows how to turn bytes into typed frames
//! and back. Everything stateful lives upstream.

pub mod cip;
pub mod constants;
pub mod endian;
pub mod enip;
pub mod epath;
pub mod error;
pub mod identity;
pub mod services;

pub use cip::{CipCodecOptions, CipRequest, CipResponse, CipValue};
pub use endian::Endianness;
pub use enip::{Command, CpfItem, Encapsulation};
pub use epath::{EPath, Segment};
pub use error::{ProtocolError, Result};
pub use identity::{IdentityItem, SocketAddress, build_list_identity_response, parse_list_identity_response};
