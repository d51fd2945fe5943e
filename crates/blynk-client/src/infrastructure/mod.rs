//! Infrastructure layer: OS-facing adapters.
//!
//! Contains the socket transport and configuration file storage.
//!
//! **Dependency rule**: the `application` layer only sees the `Transport`
//! trait; concrete adapters are chosen by `main.rs` or by tests.

pub mod storage;
pub mod transport;
