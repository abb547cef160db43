//! # hidseq-core
//!
//! Shared library for hidseq containing the device codec, key tables and the
//! bookkeeping that keeps concurrent input sequences consistent.
//!
//! It has no dependencies on serial ports, subprocesses or async runtimes; the
//! `hidseq-engine` crate supplies those at the edges.
//!
//! # Architecture overview
//!
//! hidseq drives a microcontroller that pretends to be a USB keyboard and
//! mouse.  Callers submit *sequences* (press, delay, release, move, click),
//! and the engine plays them back step by step over a serial link.  Several
//! sequences can play at once, so the hard part is never leaving a key
//! physically down that nobody owns:
//!
//! - **`keymap`** – key names and the one-byte codes the firmware understands.
//! - **`protocol`** – fixed 8-byte command frames and their encoder/decoder.
//! - **`domain`** – actions, the key ownership registry, the resource guard,
//!   and the echo ledger used by the passive keyboard listener.

pub mod domain;
pub mod keymap;
pub mod protocol;

pub use domain::action::{requires_pointer_guard, sample_delay_ms, Action, MouseButton, MoveMode};
pub use domain::echo::{EchoLedger, ObservedKeyState};
pub use domain::guard::{ResourceGuard, ResourceToggle, ToggleError, ToggleState};
pub use domain::registry::{KeyChange, KeyRegistry, Owner};
pub use keymap::{resolve_key_name, PhysicalKey};
pub use protocol::codec::{decode_frame, encode_frame, Frame, ProtocolError};
