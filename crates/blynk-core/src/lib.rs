//! # blynk-core
//!
//! Transport-independent pieces of the Blynk device protocol: the binary
//! frame codec, HARDWARE payload parsing, request/response correlation, and
//! the timing rules for heartbeats and reconnects.
//!
//! This crate performs no I/O and has no notion of sockets or clocks beyond
//! the [`std::time::Instant`] values its callers pass in.  That makes every
//! rule here testable with synthetic time.
//!
//! # Architecture overview (for beginners)
//!
//! A Blynk device keeps one TCP connection to the Blynk server.  Over it
//! travel small *frames*: a 5-byte header (command, message id, length)
//! followed by a payload of `\0`-separated strings.  The device logs in with
//! an auth token, pings the server periodically, and exchanges *virtual pin*
//! values with the server's dashboard widgets.
//!
//! - **`protocol`** – Frame layout, the codec, HARDWARE payloads, and the
//!   message-id correlator.
//!
//! - **`domain`** – Timing policy with no wire knowledge: the keepalive
//!   monitor and the reconnect backoff.

pub mod domain;
pub mod protocol;

pub use domain::backoff::{ReconnectPolicy, MAX_RECONNECT_DELAY};
pub use domain::keepalive::{KeepaliveAction, KeepaliveMonitor};
pub use protocol::codec::{encode_frame, try_decode, try_decode_with_limit, Decoded, ProtocolError};
pub use protocol::command::{Command, Frame, FrameBody};
pub use protocol::correlator::{MessageCorrelator, PendingRequest, RequestKind};
pub use protocol::hardware::{HardwareCommand, HardwareError, VirtualPin};
