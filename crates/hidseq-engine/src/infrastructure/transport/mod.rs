//! Device transports.
//!
//! - [`serial::SerialTransport`]: the real link to the microcontroller.
//! - [`mock::MockTransport`]: in-memory recorder used by tests and dry runs.

pub mod mock;
pub mod serial;

pub use mock::MockTransport;
pub use serial::SerialTransport;
