//! Protocol module containing frame types, the binary codec, HARDWARE
//! payloads, and message-id correlation.

pub mod codec;
pub mod command;
pub mod correlator;
pub mod hardware;

pub use codec::{encode_frame, try_decode, try_decode_with_limit, Decoded, ProtocolError};
pub use command::*;
pub use correlator::{MessageCorrelator, PendingRequest, RequestKind};
pub use hardware::{HardwareCommand, HardwareError, VirtualPin};
