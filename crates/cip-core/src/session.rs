//! Session registry and state machine (C8, §3/§4.8/§4.15).
//!
//! ```text
//! ┌──────┐  RegisterSession success   ┌────────────┐   Unregister/idle/close
//! │ NONE │────────────────────────────>│ REGISTERED │──────────────────────>┌────────┐
//! └──────┘                             └────────────┘                       │ CLOSED │
//!                                                                            └────────┘
//! ```
//!
//! Sessions are looked up by value-keyed id, never by pointer; a
//! connection that belongs to a session stores only the session's id and
//! re-resolves it through the registry on every use (§9's "cyclic
//! references avoided" note).

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::error::{CoreError, Result};

/// Default idle timeout before a session is evicted by the reaper.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session has been registered yet (the handle has never existed).
    None,
    /// RegisterSession succeeded; the session accepts requests.
    Registered,
    /// UnregisterSession, transport close, or idle eviction ended it.
    Closed,
}

/// A registered ENIP session (§3).
#[derive(Debug, Clone)]
pub struct Session {
    /// Non-zero, server-allocated session id.
    pub id: u32,
    /// Originator's address, as seen by the transport (e.g. `"10.0.0.5:51233"`).
    pub originator_address: String,
    /// Sender context from the RegisterSession request, echoed on replies.
    pub sender_context: [u8; 8],
    /// Last time this session saw any traffic.
    pub last_activity: Instant,
    /// Current lifecycle state.
    pub state: SessionState,
}

impl Session {
    fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }
}

/// In-memory session registry, keyed by session id.
///
/// IDs are allocated from a monotonic counter seeded at startup; zero is
/// forbidden (§3, §4.8).
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<u32, Session>,
    next_id: u32,
    idle_timeout: Duration,
}

impl SessionRegistry {
    /// Create an empty registry. `seed` is the first id that will be
    /// allocated if nonzero; a zero seed is bumped to `1` since id `0` is
    /// forbidden.
    #[must_use]
    pub fn new(seed: u32, idle_timeout: Duration) -> Self {
        Self { sessions: HashMap::new(), next_id: seed.max(1), idle_timeout }
    }

    /// Register a new session, allocating the next id.
    pub fn register(&mut self, originator_address: String, sender_context: [u8; 8], now: Instant) -> &Session {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let session =
            Session { id, originator_address, sender_context, last_activity: now, state: SessionState::Registered };
        self.sessions.entry(id).or_insert(session)
    }

    /// Look up a session by id.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Record activity on a session, extending its idle timer. Returns an
    /// error if the session doesn't exist or isn't registered.
    pub fn touch(&mut self, id: u32, now: Instant) -> Result<()> {
        let session = self.require_registered(id)?;
        session.touch(now);
        Ok(())
    }

    /// End a session (UnregisterSession or transport close).
    pub fn unregister(&mut self, id: u32) -> Result<()> {
        let session = self.sessions.get_mut(&id).ok_or(CoreError::InvalidSessionHandle { session_id: id, state: None })?;
        session.state = SessionState::Closed;
        Ok(())
    }

    /// Evict every session whose last activity is older than the
    /// registry's configured idle timeout, returning their ids.
    pub fn reap_idle(&mut self, now: Instant) -> Vec<u32> {
        let mut reaped = Vec::new();
        for session in self.sessions.values_mut() {
            if session.state == SessionState::Registered && now.duration_since(session.last_activity) > self.idle_timeout
            {
                session.state = SessionState::Closed;
                reaped.push(session.id);
            }
        }
        reaped
    }

    /// True if `id` names a session currently in the `Registered` state.
    #[must_use]
    pub fn is_active(&self, id: u32) -> bool {
        self.sessions.get(&id).is_some_and(|s| s.state == SessionState::Registered)
    }

    fn require_registered(&mut self, id: u32) -> Result<&mut Session> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(CoreError::InvalidSessionHandle { session_id: id, state: None })?;
        if session.state != SessionState::Registered {
            return Err(CoreError::InvalidSessionHandle { session_id: id, state: Some(session.state) });
        }
        Ok(session)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(1, DEFAULT_SESSION_IDLE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_allocates_nonzero_monotonic_ids() {
        let mut registry = SessionRegistry::new(1, DEFAULT_SESSION_IDLE_TIMEOUT);
        let now = Instant::now();
        let first = registry.register("10.0.0.1:1".to_string(), [0; 8], now).id;
        let second = registry.register("10.0.0.2:1".to_string(), [0; 8], now).id;
        assert_ne!(first, 0);
        assert_ne!(second, 0);
        assert!(second > first);
    }

    #[test]
    fn unregistered_id_is_not_active() {
        let registry = SessionRegistry::new(1, DEFAULT_SESSION_IDLE_TIMEOUT);
        assert!(!registry.is_active(42));
    }

    #[test]
    fn unregister_closes_session() {
        let mut registry = SessionRegistry::new(1, DEFAULT_SESSION_IDLE_TIMEOUT);
        let now = Instant::now();
        let id = registry.register("a".to_string(), [0; 8], now).id;
        assert!(registry.is_active(id));
        registry.unregister(id).unwrap();
        assert!(!registry.is_active(id));
    }

    #[test]
    fn idle_reaper_evicts_stale_sessions() {
        let mut registry = SessionRegistry::new(1, Duration::from_millis(1));
        let now = Instant::now();
        let id = registry.register("a".to_string(), [0; 8], now).id;
        std::thread::sleep(Duration::from_millis(5));
        let reaped = registry.reap_idle(Instant::now());
        assert_eq!(reaped, vec![id]);
        assert!(!registry.is_active(id));
    }

    #[test]
    fn touch_on_unknown_session_is_invalid_session_handle() {
        let mut registry = SessionRegistry::new(1, DEFAULT_SESSION_IDLE_TIMEOUT);
        let err = registry.touch(999, Instant::now()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSessionHandle { session_id: 999, .. }));
    }
}
