//! Error types for session, connection, validator and dispatch logic.
//!
//! Strongly-typed per §7's error kinds (*state*, *contract*, *handler*),
//! each converting into the next layer the way the teacher's
//! `ConnectionError` chain converts from its protocol-layer error type.
//! We avoid a type-erased error crate at this boundary, matching the
//! teacher's choice.

use std::io;

use thiserror::Error;

use crate::session::SessionState;

/// Errors surfaced while maintaining session/connection state, validating
/// requests, or dispatching handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No session exists for the given id, or the session is not in a
    /// state that accepts this request (§4.8's `isConnectionActive` rule
    /// and the session state machine in §4.15).
    #[error("no active session {session_id:#010x} (state: {state:?})")]
    InvalidSessionHandle {
        /// The session id that was looked up.
        session_id: u32,
        /// State found for the session, if it exists at all.
        state: Option<SessionState>,
    },

    /// A session already exists / is being registered twice for an id
    /// that should be fresh.
    #[error("duplicate session id {0:#010x}")]
    DuplicateSession(u32),

    /// No I/O connection exists for the given id, or it is not `OPEN`.
    #[error("no active connection {connection_id:#010x}")]
    InvalidConnection {
        /// The connection id that was looked up.
        connection_id: u32,
    },

    /// Strict-mode validator rejected a request or response.
    #[error("validator rejected {subject}: {reason}")]
    ContractViolation {
        /// What was being validated (e.g. "RegisterSession request").
        subject: String,
        /// Human-readable rejection reason.
        reason: String,
    },

    /// A handler-level failure: unknown class/instance/attribute, an
    /// attribute that isn't writable, or a service the personality doesn't
    /// implement.
    #[error("handler error for class {class:#06x} service {service:#04x}: {reason}")]
    Handler {
        /// CIP class the request targeted.
        class: u16,
        /// CIP service code requested.
        service: u8,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Wire-layer decode failure bubbled up from `cip-proto`.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The calling operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl CoreError {
    /// The ENIP-level status this error maps to at the server boundary,
    /// per §7's propagation policy. Returns `None` for errors that never
    /// reach the ENIP layer directly (e.g. handler errors, which become a
    /// CIP-level general-error response instead).
    #[must_use]
    pub fn enip_status(&self) -> Option<u32> {
        match self {
            Self::InvalidSessionHandle { .. } | Self::InvalidConnection { .. } => {
                Some(cip_proto::enip::status::INVALID_SESSION_HANDLE)
            },
            Self::Protocol(_) => Some(cip_proto::enip::status::INVALID_LENGTH),
            _ => None,
        }
    }

    /// True if this error is a fault-scheduler-style non-error outcome
    /// rather than a genuine failure. Cancellation is the one `CoreError`
    /// variant that is expected during orderly shutdown.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<cip_proto::ProtocolError> for CoreError {
    fn from(err: cip_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<CoreError> for io::Error {
    fn from(err: CoreError) -> Self {
        let kind = match &err {
            CoreError::Transport(_) => io::ErrorKind::Other,
            CoreError::Cancelled => io::ErrorKind::Interrupted,
            _ => io::ErrorKind::InvalidData,
        };
        Self::new(kind, err.to_string())
    }
}

/// Result alias used throughout `cip-core`.
pub type Result<T> = std::result::Result<T, CoreError>;
