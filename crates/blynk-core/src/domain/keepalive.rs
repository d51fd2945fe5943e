//! Heartbeat timing for an authenticated session.
//!
//! The Blynk server drops devices that stay silent for longer than its own
//! idle timeout, which is stricter than the heartbeat period the device
//! advertises.  The client therefore pings *proactively*:
//!
//! | Condition                                   | Action             |
//! |---------------------------------------------|--------------------|
//! | nothing received for `2 × period`           | connection is dead |
//! | nothing sent for `period`                   | send PING          |
//! | nothing received for `period`               | send PING          |
//!
//! Pings are rate-limited to one per `period / 10` so a stalled socket does
//! not turn into a ping storm.
//!
//! "We are silent" (send side) and "the server is silent" (receive side) are
//! tracked separately: only receive-side silence can kill the connection.

use std::time::{Duration, Instant};

/// What the run loop should do after polling the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveAction {
    /// Nothing is due.
    Idle,
    /// A PING frame should be sent now.
    SendPing,
    /// The server has been silent for two full periods.
    ConnectionDead,
}

/// Tracks last send/receive times against a heartbeat period.
#[derive(Debug, Clone)]
pub struct KeepaliveMonitor {
    period: Duration,
    last_send: Instant,
    last_recv: Instant,
    last_ping: Option<Instant>,
}

impl KeepaliveMonitor {
    /// Creates a monitor with both timers starting at `now`.
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            last_send: now,
            last_recv: now,
            last_ping: None,
        }
    }

    /// Restarts both timers at `now`.  Called when a session is authenticated.
    pub fn reset(&mut self, now: Instant) {
        self.last_send = now;
        self.last_recv = now;
        self.last_ping = None;
    }

    /// Records a successful write to the transport.
    pub fn record_send(&mut self, now: Instant) {
        self.last_send = now;
    }

    /// Records a frame received from the server.
    pub fn record_recv(&mut self, now: Instant) {
        self.last_recv = now;
    }

    /// Records that a PING was queued at `now`.
    pub fn record_ping(&mut self, now: Instant) {
        self.last_ping = Some(now);
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time after which a silent server is declared dead.
    pub fn dead_after(&self) -> Duration {
        self.period.saturating_mul(2)
    }

    pub fn last_send(&self) -> Instant {
        self.last_send
    }

    pub fn last_recv(&self) -> Instant {
        self.last_recv
    }

    /// Decides what is due at `now`.
    pub fn poll(&self, now: Instant) -> KeepaliveAction {
        let recv_silence = now.saturating_duration_since(self.last_recv);
        if recv_silence >= self.dead_after() {
            return KeepaliveAction::ConnectionDead;
        }

        let ping_allowed = self
            .last_ping
            .map_or(true, |at| now.saturating_duration_since(at) >= self.period / 10);
        let send_silence = now.saturating_duration_since(self.last_send);

        if ping_allowed && (send_silence >= self.period || recv_silence >= self.period) {
            KeepaliveAction::SendPing
        } else {
            KeepaliveAction::Idle
        }
    }
}
