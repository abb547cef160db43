//! Infrastructure layer for the engine.
//!
//! Contains OS-facing adapters: the serial link to the HID emulator, the
//! pointer-precision toggle program, a dead-reckoning cursor, and TOML config
//! storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `hidseq_core`, but MUST NOT be imported by the `application` layer (tests
//! excepted).

pub mod cursor;
pub mod storage;
pub mod toggle;
pub mod transport;
