//! Server configuration (§1's ambient-stack note: a plain struct with a
//! `Default` impl and programmatic builder methods - no YAML loader, that
//! stays an external collaborator per §1's out-of-scope list).

use std::time::Duration;

use cip_core::{connection::DEFAULT_CONNECTION_IDLE_TIMEOUT, profile::Profile, session::DEFAULT_SESSION_IDLE_TIMEOUT};

use crate::{fault::FaultConfig, personality::generic_object::ObjectClassSelection};

/// TCP port for explicit messaging / UCMM (§6).
pub const EXPLICIT_MESSAGING_PORT: u16 = 44818;

/// UDP port for implicit (connected) I/O (§6).
pub const IMPLICIT_IO_PORT: u16 = 2222;

/// Everything a [`crate::Server`] needs to start: bind addresses, the
/// protocol profile, timeouts, which generic-object classes are enabled,
/// and the fault-injection schedule.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address (host only; ports are fixed by §6) to bind the TCP and UDP
    /// listeners on.
    pub bind_host: String,
    /// Protocol profile every codec call on this server uses.
    pub profile: Profile,
    /// Session idle eviction timeout.
    pub session_idle_timeout: Duration,
    /// I/O connection idle eviction timeout.
    pub connection_idle_timeout: Duration,
    /// Which generic-object classes (§4.12) this server exposes.
    pub generic_object_classes: ObjectClassSelection,
    /// Fault-injection schedule (§4.14).
    pub fault: FaultConfig,
}

impl ServerConfig {
    /// Override the bind host (ports stay fixed at 44818/2222 per §6).
    #[must_use]
    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    /// Override the protocol profile.
    #[must_use]
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Override which generic-object classes are enabled.
    #[must_use]
    pub fn with_generic_object_classes(mut self, classes: ObjectClassSelection) -> Self {
        self.generic_object_classes = classes;
        self
    }

    /// Override the fault-injection schedule.
    #[must_use]
    pub fn with_fault(mut self, fault: FaultConfig) -> Self {
        self.fault = fault;
        self
    }

    /// TCP/UDP explicit-messaging bind address.
    #[must_use]
    pub fn explicit_messaging_addr(&self) -> String {
        format!("{}:{EXPLICIT_MESSAGING_PORT}", self.bind_host)
    }

    /// UDP implicit-I/O bind address.
    #[must_use]
    pub fn implicit_io_addr(&self) -> String {
        format!("{}:{IMPLICIT_IO_PORT}", self.bind_host)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            profile: Profile::strict_odva(),
            session_idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
            connection_idle_timeout: DEFAULT_CONNECTION_IDLE_TIMEOUT,
            generic_object_classes: ObjectClassSelection::default(),
            fault: FaultConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_binds_well_known_ports() {
        let config = ServerConfig::default();
        assert_eq!(config.explicit_messaging_addr(), "127.0.0.1:44818");
        assert_eq!(config.implicit_io_addr(), "127.0.0.1:2222");
    }

    #[test]
    fn builder_overrides_profile() {
        let config = ServerConfig::default().with_profile(Profile::legacy_compat());
        assert_eq!(config.profile.name, "legacy_compat");
    }
}
