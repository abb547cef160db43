//! Physical key identifiers and key-name resolution.
//!
//! The canonical key representation is the one-byte key code understood by
//! the HID emulator firmware.  Everything above the wire (profiles, the
//! command library, log output) refers to keys by name; names are resolved
//! to a [`PhysicalKey`] exactly once, when a step executes.

pub mod names;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use names::resolve_key_name;

/// Device-level key identifier.
///
/// Wraps the byte the firmware expects in the `key` field of a `PRESS` or
/// `RELEASE` frame.  Two keys are the same physical key iff their codes match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysicalKey(u8);

impl PhysicalKey {
    /// Wraps a raw device key code.
    pub const fn new(code: u8) -> Self {
        Self(code)
    }

    /// Returns the raw device key code written to the wire.
    pub const fn code(self) -> u8 {
        self.0
    }

    /// Returns `true` for the eight modifier keys (Ctrl/Shift/Alt/GUI, both sides).
    pub const fn is_modifier(self) -> bool {
        matches!(self.0, 0x80..=0x87)
    }
}

impl fmt::Display for PhysicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match names::canonical_name(*self) {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "0x{:02X}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_range_covers_ctrl_through_right_gui() {
        assert!(PhysicalKey::new(0x80).is_modifier());
        assert!(PhysicalKey::new(0x87).is_modifier());
        assert!(!PhysicalKey::new(0x88).is_modifier());
        assert!(!PhysicalKey::new(b'a').is_modifier());
    }

    #[test]
    fn test_display_uses_canonical_name_when_known() {
        assert_eq!(PhysicalKey::new(0x81).to_string(), "shift");
        assert_eq!(PhysicalKey::new(b'k').to_string(), "k");
    }

    #[test]
    fn test_display_falls_back_to_hex_for_unnamed_codes() {
        assert_eq!(PhysicalKey::new(0x01).to_string(), "0x01");
    }
}
