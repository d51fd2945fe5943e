//! Transport collaborator: the byte pipe underneath the Blynk session.
//!
//! The session never blocks, so every implementation must be poll-style:
//! `send` writes what it can right now, `recv` returns whatever is buffered
//! (possibly nothing).  Opening the connection is the one call that may take
//! a bounded amount of time; see [`tcp::TcpTransport`].
//!
//! # Implementations
//!
//! - **`tcp`** – `std::net::TcpStream` switched to non-blocking mode.
//! - **`mock`** – in-memory transport that records outbound bytes and replays
//!   scripted inbound bytes.  Used by unit and integration tests.

pub mod mock;
pub mod tcp;

use thiserror::Error;

/// Errors reported by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The host name did not resolve to any address.
    #[error("could not resolve {host}:{port}")]
    Resolve { host: String, port: u16 },

    /// Opening the connection failed.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The write could not make progress without blocking.  Not fatal.
    #[error("operation would block")]
    WouldBlock,

    /// `send`/`recv` was called without an open connection.
    #[error("transport is not connected")]
    NotConnected,

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// Any other I/O failure on an established connection.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-blocking, connection-oriented byte transport.
pub trait Transport {
    /// Opens a connection to `host:port`, replacing any previous one.
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError>;

    /// Writes as much of `bytes` as possible without blocking.
    ///
    /// Returns the number of bytes written, or [`TransportError::WouldBlock`]
    /// when nothing could be written right now.
    fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportError>;

    /// Reads whatever is available into `buf` without blocking.
    ///
    /// `Ok(0)` means no data is ready.  A peer close is reported as
    /// [`TransportError::Closed`], never as `Ok(0)`.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Closes the connection.  Closing an already closed transport is a no-op.
    fn close(&mut self);
}
