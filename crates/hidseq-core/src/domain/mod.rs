//! Domain entities for the hidseq engine.
//!
//! Everything here is pure bookkeeping with no I/O: the executors in
//! `hidseq-engine` decide *when* to call into these types and write whatever
//! frames they return to the device.
//!
//! - [`action`] – the closed set of sequence steps and delay sampling.
//! - [`registry`] – who holds which key, and how many owners hold each key.
//! - [`guard`] – the refcounted pointer-precision guard.
//! - [`echo`] – last-sent timestamps used to filter self-caused key events.

pub mod action;
pub mod echo;
pub mod guard;
pub mod registry;
