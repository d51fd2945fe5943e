//! Domain layer: timing rules shared by every client implementation.
//!
//! Nothing here knows about bytes on the wire.  The run loop feeds in the
//! current time and the moments traffic was seen, and gets back decisions
//! ("send a ping", "the server is gone", "wait 5 s before reconnecting").

pub mod backoff;
pub mod keepalive;

pub use backoff::{ReconnectPolicy, MAX_RECONNECT_DELAY};
pub use keepalive::{KeepaliveAction, KeepaliveMonitor};
