//! Session lifecycle: `Disconnected → AwaitingLoginResponse → Authenticated`.
//!
//! # State diagram
//!
//! ```text
//!                  transport connected
//!   Disconnected ───────────────────────▶ AwaitingLoginResponse
//!        ▲  ▲                                   │          │
//!        │  │ rejected / login timeout          │          │ RESPONSE 200
//!        │  └───────────────────────────────────┘          ▼
//!        │                                           Authenticated
//!        └──────────────── error / keepalive timeout ──────┘
//! ```
//!
//! `Session` only tracks *which* state the connection is in and *when* the
//! next connection attempt is allowed.  Sending frames, closing the socket
//! and firing handlers are the run loop's job (see `client.rs`); the
//! transition methods report what happened so the caller can react.

use std::time::{Duration, Instant};

use blynk_core::{ProtocolError, ReconnectPolicy};
use serde::Serialize;
use thiserror::Error;

use crate::infrastructure::transport::TransportError;

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    AwaitingLoginResponse,
    Authenticated,
}

/// Why a session ended.
///
/// None of these reach the embedding application directly: they are logged,
/// the session is torn down, and a reconnect is scheduled.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Socket-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server sent bytes that are not a valid frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server answered LOGIN with a non-success status.
    #[error("login rejected by server (status {status})")]
    AuthRejected { status: u16 },

    /// No answer to LOGIN within the login timeout.
    #[error("no login response within {0:?}")]
    LoginTimeout(Duration),

    /// Nothing received from the server for two heartbeat periods.
    #[error("no traffic from server for {0:?}")]
    KeepaliveTimeout(Duration),

    /// The outbound queue grew past its bound because the socket stopped
    /// accepting writes.
    #[error("{0} bytes queued for a socket that is not draining")]
    OutboundOverflow(usize),

    /// The application called `disconnect`.
    #[error("disconnect requested by application")]
    Requested,
}

/// The session state machine.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    policy: ReconnectPolicy,
    consecutive_failures: u32,
    next_attempt_at: Option<Instant>,
}

impl Session {
    /// Creates a disconnected session that may connect immediately.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: SessionState::Disconnected,
            policy,
            consecutive_failures: 0,
            next_attempt_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// When the next connection attempt is allowed; `None` means immediately.
    pub fn next_attempt_at(&self) -> Option<Instant> {
        self.next_attempt_at
    }

    /// Returns `true` if the session is disconnected and the backoff window
    /// has elapsed.
    pub fn reconnect_due(&self, now: Instant) -> bool {
        self.state == SessionState::Disconnected && self.next_attempt_at.map_or(true, |at| now >= at)
    }

    /// Handles the "transport connected" signal.
    ///
    /// Returns `true` if the caller should now send LOGIN.  A second signal
    /// while a login is already outstanding (or after authentication) is
    /// ignored and returns `false`.
    pub fn on_transport_connected(&mut self) -> bool {
        match self.state {
            SessionState::Disconnected => {
                self.state = SessionState::AwaitingLoginResponse;
                true
            }
            SessionState::AwaitingLoginResponse | SessionState::Authenticated => false,
        }
    }

    /// Handles the RESPONSE to LOGIN.
    ///
    /// Returns `true` if the session just became authenticated.
    pub fn on_login_accepted(&mut self) -> bool {
        if self.state != SessionState::AwaitingLoginResponse {
            return false;
        }
        self.state = SessionState::Authenticated;
        self.consecutive_failures = 0;
        self.next_attempt_at = None;
        true
    }

    /// Moves to `Disconnected` and schedules the next attempt after the
    /// backoff delay.
    ///
    /// Returns the state the session was in, so the caller can decide whether
    /// a `Disconnected` event is owed (only when leaving `Authenticated`).
    pub fn on_failure(&mut self, now: Instant) -> SessionState {
        let previous = self.state;
        self.state = SessionState::Disconnected;
        self.schedule_retry(now);
        previous
    }

    /// Records a failed connection attempt (transport never connected).
    pub fn on_connect_failed(&mut self, now: Instant) {
        self.state = SessionState::Disconnected;
        self.schedule_retry(now);
    }

    /// Delay that the next failure will impose.
    pub fn next_delay(&self) -> Duration {
        self.policy.delay(self.consecutive_failures)
    }

    fn schedule_retry(&mut self, now: Instant) {
        let delay = self.next_delay();
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.next_attempt_at = Some(now.checked_add(delay).unwrap_or(now));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
