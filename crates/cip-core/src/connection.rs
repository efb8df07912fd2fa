//! Connected I/O connection registry and state machine (C8, §3/§4.8/§4.15,
//! connection-id ranges from §9).
//!
//! ```text
//! ┌──────┐  Forward_Open success   ┌──────┐  Forward_Close / session closed /
//! │ NONE │─────────────────────────>│ OPEN │───────────────────────────────>┌────────┐
//! └──────┘                          └──────┘           inactivity           │ CLOSED │
//!                                                                            └────────┘
//! ```

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use cip_proto::epath::EPath;

use crate::error::{CoreError, Result};

/// Default idle timeout before an I/O connection is reaped.
pub const DEFAULT_CONNECTION_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Base of the `Forward_Open` connection-id range (§9): ids are
/// `0x10000000 + n*2` (O->T) and `+1` (T->O).
pub const FORWARD_OPEN_ID_BASE: u32 = 0x1000_0000;

/// Base of the `Large_Forward_Open` connection-id range (§9).
pub const LARGE_FORWARD_OPEN_ID_BASE: u32 = 0x2000_0000;

/// Lifecycle state of an I/O connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLifecycle {
    /// No connection exists for this id.
    None,
    /// `Forward_Open` succeeded; I/O traffic is accepted.
    Open,
    /// `Forward_Close`, parent session termination, or inactivity ended it.
    Closed,
}

/// Parameters negotiated by `Forward_Open` (§3).
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Originator-to-target requested packet interval, microseconds.
    pub o_to_t_rpi_us: u32,
    /// Target-to-originator requested packet interval, microseconds.
    pub t_to_o_rpi_us: u32,
    /// Originator-to-target connection size, bytes.
    pub o_to_t_size: u16,
    /// Target-to-originator connection size, bytes.
    pub t_to_o_size: u16,
    /// Transport class/trigger byte.
    pub transport_class: u8,
    /// Priority/time-tick byte from the request.
    pub priority: u8,
    /// Connection path from the `Forward_Open` request.
    pub connection_path: EPath,
}

/// A connected I/O connection (§3).
#[derive(Debug, Clone)]
pub struct IoConnection {
    /// This connection's id (either the O->T or T->O id; each is tracked
    /// as its own registry entry since either may be looked up by a peer).
    pub conn_id: u32,
    /// Parent session id.
    pub session_id: u32,
    /// Negotiated parameters.
    pub params: ConnectionParams,
    /// Current I/O sequence counter.
    pub sequence: u16,
    /// Last time I/O traffic was seen on this connection.
    pub last_activity: Instant,
    /// Current lifecycle state.
    pub state: ConnectionLifecycle,
}

/// A freshly allocated O->T / T->O connection-id pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionIdPair {
    /// Originator-to-target connection id.
    pub o_to_t: u32,
    /// Target-to-originator connection id.
    pub t_to_o: u32,
}

/// In-memory I/O connection registry, keyed by connection id.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<u32, IoConnection>,
    next_index: u32,
    idle_timeout: Duration,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self { connections: HashMap::new(), next_index: 0, idle_timeout }
    }

    /// Allocate an O->T/T->O id pair from the `Forward_Open` range and
    /// register both entries against `session_id`.
    pub fn open(&mut self, session_id: u32, params: ConnectionParams, large: bool, now: Instant) -> ConnectionIdPair {
        let base = if large { LARGE_FORWARD_OPEN_ID_BASE } else { FORWARD_OPEN_ID_BASE };
        let n = self.next_index;
        self.next_index = self.next_index.wrapping_add(1);
        let pair = ConnectionIdPair { o_to_t: base + n * 2, t_to_o: base + n * 2 + 1 };

        for conn_id in [pair.o_to_t, pair.t_to_o] {
            self.connections.insert(
                conn_id,
                IoConnection {
                    conn_id,
                    session_id,
                    params: params.clone(),
                    sequence: 0,
                    last_activity: now,
                    state: ConnectionLifecycle::Open,
                },
            );
        }
        pair
    }

    /// Look up a connection by id.
    #[must_use]
    pub fn get(&self, conn_id: u32) -> Option<&IoConnection> {
        self.connections.get(&conn_id)
    }

    /// `isConnectionActive` from §4.8: the id exists, is `Open`, and its
    /// last activity is newer than `idle_timeout`.
    #[must_use]
    pub fn is_active(&self, conn_id: u32, now: Instant) -> bool {
        self.connections.get(&conn_id).is_some_and(|conn| {
            conn.state == ConnectionLifecycle::Open && now.duration_since(conn.last_activity) <= self.idle_timeout
        })
    }

    /// Record I/O activity and advance the sequence counter, returning the
    /// value that was just used.
    pub fn touch_and_advance_sequence(&mut self, conn_id: u32, now: Instant) -> Result<u16> {
        let conn = self
            .connections
            .get_mut(&conn_id)
            .ok_or(CoreError::InvalidConnection { connection_id: conn_id })?;
        if conn.state != ConnectionLifecycle::Open {
            return Err(CoreError::InvalidConnection { connection_id: conn_id });
        }
        conn.last_activity = now;
        let seq = conn.sequence;
        conn.sequence = conn.sequence.wrapping_add(1);
        Ok(seq)
    }

    /// Close a connection (`Forward_Close`).
    pub fn close(&mut self, conn_id: u32) -> Result<()> {
        let conn =
            self.connections.get_mut(&conn_id).ok_or(CoreError::InvalidConnection { connection_id: conn_id })?;
        conn.state = ConnectionLifecycle::Closed;
        Ok(())
    }

    /// Close every connection belonging to `session_id` (parent session
    /// termination reaps its connections).
    pub fn close_all_for_session(&mut self, session_id: u32) -> Vec<u32> {
        let mut closed = Vec::new();
        for conn in self.connections.values_mut() {
            if conn.session_id == session_id && conn.state == ConnectionLifecycle::Open {
                conn.state = ConnectionLifecycle::Closed;
                closed.push(conn.conn_id);
            }
        }
        closed
    }

    /// Evict every connection idle past the registry's configured timeout.
    pub fn reap_idle(&mut self, now: Instant) -> Vec<u32> {
        let mut reaped = Vec::new();
        for conn in self.connections.values_mut() {
            if conn.state == ConnectionLifecycle::Open && now.duration_since(conn.last_activity) > self.idle_timeout {
                conn.state = ConnectionLifecycle::Closed;
                reaped.push(conn.conn_id);
            }
        }
        reaped
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTION_IDLE_TIMEOUT)
    }
}
