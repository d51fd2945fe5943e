//! Binary codec for Blynk frames.
//!
//! Wire format:
//! ```text
//! [command:1][message_id:2][length:2][payload:length]
//! ```
//! All multi-byte integers are big-endian.  RESPONSE frames are header-only:
//! their `length` field carries the status code.
//!
//! # Partial reads (for beginners)
//!
//! A TCP socket delivers a *stream* of bytes, not messages.  One `recv` may
//! return half a frame, or three frames and the start of a fourth.  The caller
//! therefore keeps a receive buffer, appends whatever arrived, and calls
//! [`try_decode`] in a loop.  Each successful call reports how many bytes it
//! consumed; [`Decoded::Incomplete`] means "keep the bytes, wait for more".
//!
//! Header fields are validated as soon as they are available, so a corrupt
//! stream is rejected without waiting for a payload that may never come.

use thiserror::Error;

use crate::protocol::command::{
    Command, Frame, FrameBody, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAX_WIRE_PAYLOAD,
};

/// Errors that can occur during frame encoding or decoding.
///
/// Any decode error means the byte stream can no longer be trusted; the
/// connection must be dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The command byte is not a known protocol command.
    #[error("unknown command: {0}")]
    UnknownCommand(u8),

    /// Message id 0 is reserved and never valid on the wire.
    #[error("message id 0 is reserved")]
    ZeroMessageId,

    /// The declared payload length exceeds the configured sanity bound.
    #[error("declared payload length {declared} exceeds limit {limit}")]
    PayloadTooLarge { declared: usize, limit: usize },

    /// The payload does not fit the 16-bit length field.
    #[error("payload of {0} bytes does not fit the length field")]
    PayloadExceedsWireLimit(usize),

    /// The body variant does not match the command (status on a non-RESPONSE
    /// frame, or payload on a RESPONSE frame).
    #[error("body does not match command {0:?}")]
    BodyMismatch(Command),
}

/// Outcome of a successful [`try_decode`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame and the number of bytes it occupied.
    Frame { frame: Frame, consumed: usize },
    /// More bytes are needed.  Nothing was consumed.
    Incomplete,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Frame`] into its wire representation.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadExceedsWireLimit`] for payloads longer than
/// 65535 bytes and [`ProtocolError::BodyMismatch`] when the body variant does
/// not fit the command.
///
/// # Examples
///
/// ```rust
/// use blynk_core::protocol::{encode_frame, try_decode, Decoded, Frame};
///
/// let frame = Frame::ping(42);
/// let bytes = encode_frame(&frame).unwrap();
/// assert_eq!(bytes, [6, 0, 42, 0, 0]);
/// assert_eq!(
///     try_decode(&bytes).unwrap(),
///     Decoded::Frame { frame, consumed: 5 }
/// );
/// ```
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    let (length, payload): (u16, &[u8]) = match (&frame.body, frame.command.carries_status()) {
        (FrameBody::Status(status), true) => (*status, &[] as &[u8]),
        (FrameBody::Payload(bytes), false) => {
            if bytes.len() > MAX_WIRE_PAYLOAD {
                return Err(ProtocolError::PayloadExceedsWireLimit(bytes.len()));
            }
            (bytes.len() as u16, bytes.as_slice())
        }
        _ => return Err(ProtocolError::BodyMismatch(frame.command)),
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.push(frame.command as u8);
    buf.extend_from_slice(&frame.message_id.to_be_bytes());
    buf.extend_from_slice(&length.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes one frame from the start of `bytes` using [`DEFAULT_MAX_PAYLOAD`]
/// as the length sanity bound.
///
/// # Errors
///
/// See [`try_decode_with_limit`].
pub fn try_decode(bytes: &[u8]) -> Result<Decoded, ProtocolError> {
    try_decode_with_limit(bytes, DEFAULT_MAX_PAYLOAD)
}

/// Decodes one frame from the start of `bytes`.
///
/// Never consumes input on [`Decoded::Incomplete`].
///
/// # Errors
///
/// - [`ProtocolError::UnknownCommand`] if the first byte is not a known command.
/// - [`ProtocolError::ZeroMessageId`] if the message id is 0.
/// - [`ProtocolError::PayloadTooLarge`] if the declared length exceeds `max_payload`.
pub fn try_decode_with_limit(bytes: &[u8], max_payload: usize) -> Result<Decoded, ProtocolError> {
    let Some(&command_byte) = bytes.first() else {
        return Ok(Decoded::Incomplete);
    };
    let command = Command::try_from(command_byte)?;

    if bytes.len() < 3 {
        return Ok(Decoded::Incomplete);
    }
    let message_id = u16::from_be_bytes([bytes[1], bytes[2]]);
    if message_id == 0 {
        return Err(ProtocolError::ZeroMessageId);
    }

    if bytes.len() < HEADER_SIZE {
        return Ok(Decoded::Incomplete);
    }
    let length = u16::from_be_bytes([bytes[3], bytes[4]]);

    if command.carries_status() {
        return Ok(Decoded::Frame {
            frame: Frame::response(message_id, length),
            consumed: HEADER_SIZE,
        });
    }

    let length = length as usize;
    if length > max_payload {
        return Err(ProtocolError::PayloadTooLarge {
            declared: length,
            limit: max_payload,
        });
    }

    let total = HEADER_SIZE + length;
    if bytes.len() < total {
        return Ok(Decoded::Incomplete);
    }

    Ok(Decoded::Frame {
        frame: Frame::new(command, message_id, bytes[HEADER_SIZE..total].to_vec()),
        consumed: total,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
