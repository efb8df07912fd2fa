//! Server-side error types (§7).
//!
//! Wraps [`cip_core::CoreError`] with the additional failure modes that
//! only exist once there's a real transport and a bound listener: bind
//! failures and a rejected configuration. Follows the same layered
//! `From` conversion the core crate uses for its own errors.

use std::io;

use thiserror::Error;

/// Errors surfaced by the server binary and its transport/personality glue.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Bind address could not be parsed or bound.
    #[error("configuration error: {0}")]
    Config(String),

    /// Session, connection, validation, or dispatch failure from `cip-core`.
    #[error(transparent)]
    Core(#[from] cip_core::CoreError),

    /// Wire-layer decode failure from `cip-proto`.
    #[error(transparent)]
    Protocol(#[from] cip_proto::ProtocolError),

    /// Transport I/O failure.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

/// Result alias used throughout `cip-server`.
pub type Result<T> = std::result::Result<T, ServerError>;
