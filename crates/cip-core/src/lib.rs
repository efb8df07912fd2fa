//! Protocol profile, session/connection state, validator, and request
//! dispatch for the CIP/ENIP harness.
//!
//! This crate owns everything stateful that sits between the wire codec
//! (`cip-proto`) and the transport/personality edges (`cip-server`,
//! `cip-client`): the profile that parameterizes every codec call, the
//! session and I/O connection registries, the validator, and the
//! (class, service) dispatch registry.

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod profile;
pub mod session;
pub mod validator;

pub use connection::{ConnectionIdPair, ConnectionLifecycle, ConnectionParams, ConnectionRegistry, IoConnection};
pub use error::{CoreError, Result};
pub use profile::{IoSequenceMode, Profile, VendorVariant, default_profile};
pub use session::{Session, SessionRegistry, SessionState};
pub use validator::{Validation, ValidationMode, Validator};
