//! Client-side error types (§7).
//!
//! Mirrors `cip-core`'s `CoreError` shape: wire/state/contract errors from
//! the lower crates convert in via `From`, and this crate adds only the
//! failure modes a driver sitting on top of a live socket needs (connect
//! failure, request timeout, unexpected close).

use thiserror::Error;

/// Errors surfaced by [`crate::ClientSession`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// TCP/UDP connect failed.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// Address that was dialed.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A request did not get a response within its configured timeout.
    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout {
        /// Operation that timed out (e.g. "RegisterSession", "InvokeService").
        operation: &'static str,
        /// Elapsed milliseconds before giving up.
        elapsed_ms: u64,
    },

    /// The peer closed the transport unexpectedly.
    #[error("transport closed by peer")]
    UnexpectedClose,

    /// Wire-layer decode failure from `cip-proto`.
    #[error(transparent)]
    Protocol(#[from] cip_proto::ProtocolError),

    /// The strict validator rejected a response this driver received.
    #[error("validator rejected response: {0}")]
    ContractViolation(String),

    /// The driver was asked to do something that requires state it
    /// doesn't have (e.g. `InvokeService` before `connect`, or an I/O send
    /// on a connection that was never opened/was since closed).
    #[error("client is not in a state to do this: {0}")]
    InvalidState(String),

    /// Underlying transport I/O failure outside of connect/timeout.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The calling operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

/// Result alias used throughout `cip-client`.
pub type Result<T> = std::result::Result<T, ClientError>;
