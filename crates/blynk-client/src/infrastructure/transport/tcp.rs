//! Non-blocking TCP transport built on `std::net::TcpStream`.
//!
//! # Why not tokio? (for beginners)
//!
//! The Blynk client is driven by repeated calls to `step()` from the
//! application's own loop.  It never awaits anything; it only asks "is there
//! data?" and moves on.  A plain `TcpStream` in non-blocking mode answers
//! that question directly: `read` returns `WouldBlock` instead of waiting.
//! This keeps the library usable from any loop, async or not.
//!
//! Only `connect` may wait.  The wait is bounded by `connect_timeout` in
//! total, however many addresses the host name resolves to.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{Transport, TransportError};

/// TCP implementation of [`Transport`].
#[derive(Debug)]
pub struct TcpTransport {
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Creates a closed transport.  `connect_timeout` bounds each call to
    /// `connect`, across all resolved addresses.
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            stream: None,
        }
    }

    /// Returns `true` while a connection is open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        self.close();

        let addrs: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|_| TransportError::Resolve {
                host: host.to_owned(),
                port,
            })?
            .collect();

        let started = Instant::now();
        let mut last_error = None;
        for addr in addrs {
            let Some(remaining) = self
                .connect_timeout
                .checked_sub(started.elapsed())
                .filter(|d| !d.is_zero())
            else {
                debug!("connect budget {:?} spent before trying {addr}", self.connect_timeout);
                last_error.get_or_insert(TransportError::ConnectFailed {
                    addr: addr.to_string(),
                    source: io::Error::new(ErrorKind::TimedOut, "connect timeout elapsed"),
                });
                break;
            };
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => {
                    stream.set_nonblocking(true)?;
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("could not disable Nagle on {addr}: {e}");
                    }
                    debug!("tcp connected to {addr}");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(source) => {
                    debug!("tcp connect to {addr} failed: {source}");
                    last_error = Some(TransportError::ConnectFailed {
                        addr: addr.to_string(),
                        source,
                    });
                }
            }
        }

        Err(last_error.unwrap_or(TransportError::Resolve {
            host: host.to_owned(),
            port,
        }))
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let stream = self.stream()?;
        match stream.write(bytes) {
            Ok(0) if !bytes.is_empty() => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(TransportError::WouldBlock),
            Err(e) if e.kind() == ErrorKind::Interrupted => Err(TransportError::WouldBlock),
            Err(e) => Err(e.into()),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let stream = self.stream()?;
        match stream.read(buf) {
            Ok(0) if !buf.is_empty() => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            // The peer may already be gone; the socket is dropped either way.
            let _ = stream.shutdown(Shutdown::Both);
            debug!("tcp connection closed");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
