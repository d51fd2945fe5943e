//! Blynk command codes and wire constants.
//!
//! Every frame on the wire starts with a one-byte command code.  The set of
//! codes is fixed by the server; a byte outside this table means the stream
//! is corrupt (the protocol has no resynchronisation marker, so the only safe
//! reaction is to drop the connection).
//!
//! Only `Response`, `Login`, `HardwareLogin`, `Ping`, `Hardware` and
//! `HardwareSync` are acted upon by the client.  The remaining codes are
//! recognised so that the codec can frame them, but the session ignores them.

use serde::{Deserialize, Serialize};

use crate::protocol::codec::ProtocolError;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the fixed frame header: command (1) + message id (2) + length (2).
pub const HEADER_SIZE: usize = 5;

/// Largest payload that fits the 16-bit length field.
pub const MAX_WIRE_PAYLOAD: usize = u16::MAX as usize;

/// Default receive buffer size advertised to the server (`buff-in`).
pub const DEFAULT_RX_BUFFER_SIZE: usize = 1024;

/// Default sanity bound on a declared payload length.
///
/// Matches the server's expectation that a device never receives more than
/// twice its advertised input buffer in one frame.
pub const DEFAULT_MAX_PAYLOAD: usize = DEFAULT_RX_BUFFER_SIZE * 2;

/// Separator between string fields inside a payload.
pub const FIELD_SEPARATOR: u8 = 0;

/// Status codes carried in the length field of a RESPONSE frame.
pub mod status {
    /// The request succeeded.
    pub const SUCCESS: u16 = 200;
    /// The login token was not recognised by the server.
    pub const INVALID_TOKEN: u16 = 9;
}

// ── Command codes ─────────────────────────────────────────────────────────────

/// All command codes known to the Blynk protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Command {
    Response = 0,
    Login = 2,
    Ping = 6,
    Tweet = 12,
    Email = 13,
    Notify = 14,
    Bridge = 15,
    HardwareSync = 16,
    Internal = 17,
    Property = 19,
    Hardware = 20,
    HardwareLogin = 29,
    Redirect = 41,
    DebugPrint = 55,
    EventLog = 64,
}

impl Command {
    /// Returns `true` for RESPONSE, whose length field holds a status code
    /// instead of a payload length.
    pub fn carries_status(self) -> bool {
        self == Command::Response
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Command::Response),
            2 => Ok(Command::Login),
            6 => Ok(Command::Ping),
            12 => Ok(Command::Tweet),
            13 => Ok(Command::Email),
            14 => Ok(Command::Notify),
            15 => Ok(Command::Bridge),
            16 => Ok(Command::HardwareSync),
            17 => Ok(Command::Internal),
            19 => Ok(Command::Property),
            20 => Ok(Command::Hardware),
            29 => Ok(Command::HardwareLogin),
            41 => Ok(Command::Redirect),
            55 => Ok(Command::DebugPrint),
            64 => Ok(Command::EventLog),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// What follows the header of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    /// RESPONSE status code, transmitted in the length field.
    Status(u16),
    /// Raw payload bytes; length is written to the header.
    Payload(Vec<u8>),
}

/// One protocol message: command, message id, and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Correlates a RESPONSE with the request that caused it.  Never 0.
    pub message_id: u16,
    pub body: FrameBody,
}

impl Frame {
    /// Creates a frame with a raw payload.
    pub fn new(command: Command, message_id: u16, payload: Vec<u8>) -> Self {
        Self {
            command,
            message_id,
            body: FrameBody::Payload(payload),
        }
    }

    /// Creates a frame whose payload is `fields` joined by `\0`.
    pub fn with_fields<S: AsRef<str>>(command: Command, message_id: u16, fields: &[S]) -> Self {
        Self::new(command, message_id, join_fields(fields))
    }

    /// Creates a RESPONSE frame acknowledging `message_id` with `status`.
    pub fn response(message_id: u16, status: u16) -> Self {
        Self {
            command: Command::Response,
            message_id,
            body: FrameBody::Status(status),
        }
    }

    /// Creates a PING frame.
    pub fn ping(message_id: u16) -> Self {
        Self::new(Command::Ping, message_id, Vec::new())
    }

    /// Creates a login frame carrying the auth token as its whole payload.
    ///
    /// `command` is either [`Command::Login`] or [`Command::HardwareLogin`].
    pub fn login(command: Command, message_id: u16, token: &str) -> Self {
        Self::new(command, message_id, token.as_bytes().to_vec())
    }

    /// Returns the status code of a RESPONSE frame.
    pub fn status(&self) -> Option<u16> {
        match self.body {
            FrameBody::Status(status) => Some(status),
            FrameBody::Payload(_) => None,
        }
    }

    /// Returns the payload bytes; empty for RESPONSE frames.
    pub fn payload(&self) -> &[u8] {
        match &self.body {
            FrameBody::Payload(bytes) => bytes,
            FrameBody::Status(_) => &[],
        }
    }
}

/// Joins string fields with the `\0` separator.
pub fn join_fields<S: AsRef<str>>(fields: &[S]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            buf.push(FIELD_SEPARATOR);
        }
        buf.extend_from_slice(field.as_ref().as_bytes());
    }
    buf
}
