//! blynk-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does blynk-client do? (for beginners)
//!
//! A Blynk *device* keeps one TCP connection open to a Blynk server.  Over
//! that connection it:
//!
//! 1. Logs in with its auth token.
//! 2. Pings the server often enough that the server does not drop it.
//! 3. Receives *virtual pin* writes (`vw`) and read requests (`vr`) from the
//!    dashboard and hands them to application handlers.
//! 4. Sends its own virtual pin values back.
//!
//! The frame format and the timing rules live in `blynk-core`.  This crate
//! adds the socket, the session state machine, handler dispatch, and the
//! `step()` run loop that the application calls from its own loop:
//!
//! ```no_run
//! use std::time::Instant;
//! use blynk_client::application::client::{BlynkClient, ClientConfig};
//! use blynk_client::infrastructure::transport::tcp::TcpTransport;
//!
//! let mut client = BlynkClient::new(ClientConfig::new("YourAuthToken"), TcpTransport::default());
//! client.on_virtual_write(1, |values, _out| println!("V1 = {values:?}"));
//! client.on_virtual_read(2, |_out| Some("42".to_string()));
//! loop {
//!     client.step(Instant::now());
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! ```

/// Application layer: session, dispatch, and the run loop.
pub mod application;

/// Infrastructure layer: socket transport and config storage.
pub mod infrastructure;

pub use application::client::{BlynkClient, ClientConfig, ClientError};
pub use application::dispatch::{EventKey, HandlerRegistry, Outbound, Outbox};
pub use application::session::{SessionError, SessionState};
