//! Wire-layer error types for EPATH, CIP, and ENIP decoding.
//!
//! These are *structural* decode failures only (§7's "wire" error kind) -
//! the validator (`cip-core`) layers semantic/contract checks on top of a
//! structurally valid decode.

use thiserror::Error;

/// Result alias used throughout the codec.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Structural decode/encode failures for EPATH, CIP, and ENIP wire forms.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer ended before a segment/header/field could be fully read.
    #[error("truncated input: expected at least {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum bytes required to continue decoding.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// An EPATH segment header did not match any recognized form.
    #[error("unknown EPATH segment header {header:#04x}")]
    UnknownSegment {
        /// The offending header byte.
        header: u8,
    },

    /// A symbolic segment's declared length ran past the buffer, or its
    /// bytes were not valid ASCII.
    #[error("malformed symbolic segment: {reason}")]
    MalformedSymbolic {
        /// Human-readable description of the problem.
        reason: String,
    },

    /// EPATH byte length was odd (segments must pad to an even total).
    #[error("EPATH length {0} is not even")]
    OddPathLength(usize),

    /// ENIP encapsulation header declared a `length` the buffer cannot
    /// supply, or a `length` which disagrees with the actual payload.
    #[error("ENIP length mismatch: header claims {claimed}, data is {actual} bytes")]
    LengthMismatch {
        /// Length the header claims.
        claimed: usize,
        /// Length of the data actually available/provided.
        actual: usize,
    },

    /// An unrecognized ENIP command code.
    #[error("unknown ENIP command {0:#06x}")]
    UnknownCommand(u16),

    /// CPF item count or item length ran past the buffer.
    #[error("malformed CPF item list: {reason}")]
    MalformedCpf {
        /// Human-readable description of the problem.
        reason: String,
    },

    /// A CIP value codec mismatch (wrong declared type, bad length, etc).
    #[error("invalid CIP value encoding: {reason}")]
    InvalidValue {
        /// Human-readable description of the problem.
        reason: String,
    },

    /// A service-payload builder was asked to build something it cannot
    /// represent (e.g. a route path whose byte length is odd).
    #[error("cannot build service payload: {reason}")]
    Unbuildable {
        /// Human-readable description of the problem.
        reason: String,
    },

    /// `Multiple_Service_Packet` offsets were not monotonic or ran outside
    /// the buffer.
    #[error("invalid multiple-service offset table: {reason}")]
    InvalidOffsetTable {
        /// Human-readable description of the problem.
        reason: String,
    },
}
