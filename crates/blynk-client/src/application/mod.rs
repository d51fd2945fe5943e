//! Application layer: the Blynk session and everything that drives it.
//!
//! - **`session`** – connection lifecycle state machine and the reasons a
//!   session can end.
//! - **`dispatch`** – handler registry and the dispatcher that routes
//!   lifecycle and virtual-pin events to user closures.
//! - **`client`** – `BlynkClient`, whose `step()` pumps the transport, the
//!   codec, the correlator and the keepalive monitor.

pub mod client;
pub mod dispatch;
pub mod session;
