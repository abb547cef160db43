//! Key-name table for the HID emulator firmware.
//!
//! # How the firmware numbers keys (for beginners)
//!
//! The microcontroller runs a keyboard library that accepts one byte per key.
//! Printable keys use their lowercase ASCII value, and everything else lives in
//! the upper half of the byte range:
//!
//! | Key            | Device code |
//! |----------------|-------------|
//! | Letter A       | 0x61 (`'a'`) |
//! | Digit 1        | 0x31 (`'1'`) |
//! | Left Ctrl      | 0x80        |
//! | Left Shift     | 0x81        |
//! | Enter          | 0xB0        |
//! | F1             | 0xC2        |
//! | Up arrow       | 0xDA        |
//!
//! The firmware presses the *physical position* for a code, so `'a'` is the
//! same key whether or not Shift is held.  Uppercase letters are folded to
//! lowercase during resolution for the same reason.
//!
//! # Raw codes
//!
//! A name of the form `0xNN` resolves to that raw code.  This covers reserved
//! device keys that have no friendly name.

use super::PhysicalKey;

/// Named keys outside the printable range, plus their aliases.
///
/// The first entry for a code is its canonical name (used by `Display`).
const NAMED_KEYS: &[(&str, u8)] = &[
    // Modifiers
    ("ctrl", 0x80),
    ("lctrl", 0x80),
    ("control", 0x80),
    ("shift", 0x81),
    ("lshift", 0x81),
    ("alt", 0x82),
    ("lalt", 0x82),
    ("gui", 0x83),
    ("win", 0x83),
    ("meta", 0x83),
    ("rctrl", 0x84),
    ("rshift", 0x85),
    ("ralt", 0x86),
    ("altgr", 0x86),
    ("rgui", 0x87),
    ("rwin", 0x87),
    // Editing and whitespace
    ("enter", 0xB0),
    ("return", 0xB0),
    ("esc", 0xB1),
    ("escape", 0xB1),
    ("backspace", 0xB2),
    ("tab", 0xB3),
    ("space", 0x20),
    ("capslock", 0xC1),
    // Function keys
    ("f1", 0xC2),
    ("f2", 0xC3),
    ("f3", 0xC4),
    ("f4", 0xC5),
    ("f5", 0xC6),
    ("f6", 0xC7),
    ("f7", 0xC8),
    ("f8", 0xC9),
    ("f9", 0xCA),
    ("f10", 0xCB),
    ("f11", 0xCC),
    ("f12", 0xCD),
    // Navigation cluster
    ("printscreen", 0xCE),
    ("scrolllock", 0xCF),
    ("pause", 0xD0),
    ("insert", 0xD1),
    ("home", 0xD2),
    ("pageup", 0xD3),
    ("delete", 0xD4),
    ("del", 0xD4),
    ("end", 0xD5),
    ("pagedown", 0xD6),
    ("right", 0xD7),
    ("left", 0xD8),
    ("down", 0xD9),
    ("up", 0xDA),
    // Numpad
    ("numlock", 0xDB),
    ("num/", 0xDC),
    ("num*", 0xDD),
    ("num-", 0xDE),
    ("num+", 0xDF),
    ("numenter", 0xE0),
    ("num1", 0xE1),
    ("num2", 0xE2),
    ("num3", 0xE3),
    ("num4", 0xE4),
    ("num5", 0xE5),
    ("num6", 0xE6),
    ("num7", 0xE7),
    ("num8", 0xE8),
    ("num9", 0xE9),
    ("num0", 0xEA),
    ("num.", 0xEB),
    ("menu", 0xED),
];

/// Resolves a profile key name to a [`PhysicalKey`].
///
/// Matching is case-insensitive and ignores surrounding whitespace.  Single
/// printable ASCII characters map to their (lowercased) ASCII code.
///
/// Returns `None` when the name is unknown; the caller logs and skips the step.
///
/// # Examples
///
/// ```rust
/// use hidseq_core::keymap::{resolve_key_name, PhysicalKey};
///
/// assert_eq!(resolve_key_name("Shift"), Some(PhysicalKey::new(0x81)));
/// assert_eq!(resolve_key_name("Q"), Some(PhysicalKey::new(b'q')));
/// assert_eq!(resolve_key_name("hyper"), None);
/// ```
pub fn resolve_key_name(name: &str) -> Option<PhysicalKey> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_graphic() {
            return Some(PhysicalKey::new(c.to_ascii_lowercase() as u8));
        }
        return None;
    }

    let lower = name.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        return u8::from_str_radix(hex, 16).ok().map(PhysicalKey::new);
    }

    NAMED_KEYS
        .iter()
        .find(|(n, _)| *n == lower)
        .map(|(_, code)| PhysicalKey::new(*code))
}

/// Returns the canonical name for `key`, if it has one.
pub(crate) fn canonical_name(key: PhysicalKey) -> Option<&'static str> {
    NAMED_KEYS
        .iter()
        .find(|(_, code)| *code == key.code())
        .map(|(name, _)| *name)
        .or_else(|| printable_name(key.code()))
}

fn printable_name(code: u8) -> Option<&'static str> {
    // Lowercase letters, digits and punctuation are their own names.
    const PRINTABLE: &str = "!\"#$%&'()*+,-./0123456789:;<=>?@[\\]^_`abcdefghijklmnopqrstuvwxyz{|}~";
    let c = code as char;
    PRINTABLE.find(c).map(|i| &PRINTABLE[i..i + 1])
}
