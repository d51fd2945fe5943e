//! In-memory transport for tests.
//!
//! # Why a mock transport?
//!
//! The session logic reacts to bytes and timing, not to sockets.  Driving it
//! through a real TCP connection would make tests slow and timing-sensitive.
//! `MockTransport` replaces the socket with two byte queues:
//!
//! - bytes the test pushes with [`push_frame`](MockTransport::push_frame) are
//!   returned by `recv`, in chunks no larger than the caller's buffer;
//! - bytes the client sends are recorded and can be decoded back into frames
//!   with [`take_sent_frames`](MockTransport::take_sent_frames).
//!
//! # Usage in tests
//!
//! ```ignore
//! let mut client = BlynkClient::new(config, MockTransport::new());
//! client.step(t0);                                   // connects, sends LOGIN
//! let login = client.transport_mut().take_sent_frames();
//! client.transport_mut().push_frame(&Frame::response(1, status::SUCCESS));
//! client.step(t0);                                   // authenticated
//! ```
//!
//! # Failure flags
//!
//! Set `refuse_connect`, `fail_send`, or `fail_recv` to exercise the error
//! paths, and `send_limit` / `send_would_block` to simulate a full socket
//! buffer.

use std::collections::VecDeque;

use blynk_core::{encode_frame, try_decode_with_limit, Decoded, Frame};

use super::{Transport, TransportError};

/// A transport that records all traffic in memory.
#[derive(Debug, Default)]
pub struct MockTransport {
    /// Every `(host, port)` passed to `connect`.
    pub connect_calls: Vec<(String, u16)>,
    /// Number of times `close` was called on an open connection.
    pub close_calls: usize,
    /// When `true`, `connect` fails.
    pub refuse_connect: bool,
    /// When `true`, `send` fails with an I/O error.
    pub fail_send: bool,
    /// When `true`, `recv` fails with an I/O error.
    pub fail_recv: bool,
    /// When `true`, `send` reports `WouldBlock` and writes nothing.
    pub send_would_block: bool,
    /// Caps how many bytes a single `send` accepts.
    pub send_limit: Option<usize>,
    connected: bool,
    inbound: VecDeque<u8>,
    sent: Vec<u8>,
}

impl MockTransport {
    /// Creates a closed transport with empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Queues raw bytes for the client to receive.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }

    /// Encodes `frame` and queues it for the client to receive.
    ///
    /// # Panics
    ///
    /// Panics if the frame cannot be encoded (test fixture error).
    pub fn push_frame(&mut self, frame: &Frame) {
        let bytes = encode_frame(frame).expect("test frame must encode");
        self.push_bytes(&bytes);
    }

    /// Number of inbound bytes not yet read by the client.
    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    /// Returns and clears the bytes sent by the client.
    pub fn take_sent(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.sent)
    }

    /// Returns and clears the bytes sent by the client, decoded into frames.
    ///
    /// # Panics
    ///
    /// Panics if the client sent a malformed or truncated stream.
    pub fn take_sent_frames(&mut self) -> Vec<Frame> {
        let bytes = self.take_sent();
        let mut frames = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            match try_decode_with_limit(&bytes[offset..], u16::MAX as usize) {
                Ok(Decoded::Frame { frame, consumed }) => {
                    frames.push(frame);
                    offset += consumed;
                }
                Ok(Decoded::Incomplete) => panic!("client sent a truncated frame"),
                Err(e) => panic!("client sent a malformed frame: {e}"),
            }
        }
        frames
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        self.connect_calls.push((host.to_owned(), port));
        if self.refuse_connect {
            return Err(TransportError::ConnectFailed {
                addr: format!("{host}:{port}"),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        self.connected = true;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.fail_send {
            return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
        }
        if self.send_would_block {
            return Err(TransportError::WouldBlock);
        }
        let n = self.send_limit.map_or(bytes.len(), |limit| limit.min(bytes.len()));
        self.sent.extend_from_slice(&bytes[..n]);
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.fail_recv {
            return Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset).into());
        }
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn close(&mut self) {
        if self.connected {
            self.connected = false;
            self.close_calls += 1;
        }
    }
}
