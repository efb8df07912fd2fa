//! CIP-over-ENIP test-harness server: a process that answers as one or
//! more simulated devices under a chosen protocol profile, with an
//! optional fault-injection schedule layered on top (§5, §6).

pub mod config;
pub mod error;
pub mod fault;
pub mod personality;
pub mod server;
pub mod transport;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use fault::{FaultConfig, FaultDecision, FaultScheduler};
pub use personality::{AdapterStore, GenericObjectStore, IdentityStore, TagStore};
pub use server::Server;
