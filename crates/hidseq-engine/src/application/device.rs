//! Ports to the outside world used by the executors.
//!
//! The application layer only sees these traits.  Concrete implementations
//! (serial port, dead-reckoning cursor, recording mocks) live in the
//! infrastructure layer and are injected when the [`Engine`] is built.
//!
//! [`Engine`]: crate::application::engine::Engine

use thiserror::Error;

/// Errors raised by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The link could not be opened.
    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },
    /// A write was attempted while the link is closed.
    #[error("transport is not open")]
    NotOpen,
    /// The underlying write failed.
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),
}

/// Byte-oriented duplex link to the HID emulator.
///
/// The port name and baud rate are fixed when the transport is constructed,
/// so `open` takes no arguments and `reconnect` can reopen the same device.
pub trait Transport: Send {
    /// Opens the link.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Open`] if the device is unavailable.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Closes the link.  Closing a closed link is a no-op.
    fn close(&mut self);

    /// Writes one encoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the link is closed or the write fails.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Returns `true` while the link is open.
    fn is_open(&self) -> bool;

    /// Closes and reopens the link.
    ///
    /// # Errors
    ///
    /// Returns the error from [`Transport::open`].
    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.close();
        self.open()
    }
}

/// Source of the current pointer position for absolute mouse moves.
///
/// The firmware only understands relative movement, so an absolute target is
/// turned into a delta from wherever the cursor is now.
#[cfg_attr(test, mockall::automock)]
pub trait CursorProvider: Send {
    /// Returns the current pointer position, or `None` if it is unknown.
    fn position(&self) -> Option<(i32, i32)>;

    /// Informs the provider that the device moved the pointer by `(dx, dy)`.
    fn moved_by(&mut self, dx: i32, dy: i32);
}
