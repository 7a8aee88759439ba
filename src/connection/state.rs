//! # Connection State Machine
//!
//! Pure bookkeeping for the socket lifecycle: `Idle -> Connecting -> Open ->
//! Closed -> Connecting -> ...`. It performs no I/O; the manager calls one
//! entry point per transport event and acts on the results.

use std::fmt;

use serde::Serialize;
use tokio::time::{Duration, Instant};

/// User-visible connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Error => "Error",
        };
        f.write_str(text)
    }
}

/// Socket lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No connection attempted yet
    Idle,
    /// Open in progress
    Connecting,
    /// Socket is open
    Open,
    /// Socket closed; a reconnect may be pending
    Closed,
}

/// Connection lifecycle with a single reconnect timer
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    phase: Phase,
    status: ConnectionStatus,
    reconnect_delay: Duration,
    reconnect_at: Option<Instant>,
    shutdown: bool,
}

impl ConnectionMachine {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            status: ConnectionStatus::Connecting,
            reconnect_delay,
            reconnect_at: None,
            shutdown: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Deadline of the pending reconnect, if one is scheduled
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Begin a connection attempt
    ///
    /// Returns `false` (no-op) while a connection is already opening or open,
    /// so at most one socket exists at a time. A pending reconnect timer is
    /// cancelled because this attempt replaces it.
    pub fn connect(&mut self) -> bool {
        if matches!(self.phase, Phase::Connecting | Phase::Open) {
            return false;
        }
        self.shutdown = false;
        self.reconnect_at = None;
        self.phase = Phase::Connecting;
        self.status = ConnectionStatus::Connecting;
        true
    }

    /// The socket opened
    pub fn on_open(&mut self) {
        self.phase = Phase::Open;
        self.status = ConnectionStatus::Connected;
        self.reconnect_at = None;
    }

    /// A transport error was reported; a close is expected to follow
    pub fn on_error(&mut self) {
        self.status = ConnectionStatus::Error;
    }

    /// The socket closed (cleanly or after an error)
    ///
    /// Schedules exactly one reconnect `reconnect_delay` after `now` unless a
    /// teardown was requested. Returns whether a reconnect was scheduled.
    pub fn on_close(&mut self, now: Instant) -> bool {
        self.phase = Phase::Closed;
        self.status = ConnectionStatus::Disconnected;

        if self.shutdown {
            self.reconnect_at = None;
            return false;
        }
        self.reconnect_at = Some(now + self.reconnect_delay);
        true
    }

    /// Fire the reconnect timer if it is due
    ///
    /// Returns `true` when a new connection attempt should be made.
    pub fn reconnect_due(&mut self, now: Instant) -> bool {
        match self.reconnect_at {
            Some(deadline) if deadline <= now => {
                self.reconnect_at = None;
                self.connect()
            }
            _ => false,
        }
    }

    /// Teardown: cancel any pending reconnect and stop future ones
    ///
    /// Returns `true` if a socket is opening or open and must be closed by
    /// the caller. Safe to call in any phase.
    pub fn disconnect(&mut self) -> bool {
        self.shutdown = true;
        self.reconnect_at = None;
        matches!(self.phase, Phase::Connecting | Phase::Open)
    }
}
