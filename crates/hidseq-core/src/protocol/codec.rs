//! Binary codec for frames sent to the HID emulator.
//!
//! Wire format (every frame is exactly [`FRAME_SIZE`] bytes):
//! ```text
//! [opcode:1][key:1][dx:2][dy:2][duration_ms:2]
//! ```
//! All multi-byte integers are little-endian signed 16-bit, matching the
//! microcontroller's native layout.  Fields an opcode does not use are zero.

use thiserror::Error;

use crate::keymap::PhysicalKey;

/// Size of every frame on the wire.
pub const FRAME_SIZE: usize = 8;

/// Shortest mouse movement duration the firmware accepts.
pub const MIN_MOVE_DURATION_MS: i16 = 10;

/// Longest mouse movement duration the firmware accepts.
pub const MAX_MOVE_DURATION_MS: i16 = 5000;

/// Errors that can occur while decoding a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than one frame.
    #[error("insufficient data: need a full 8-byte frame, got {0} bytes")]
    InsufficientData(usize),

    /// The opcode byte is not a recognised command.
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),
}

/// Opcode byte identifying the frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Press = 0x01,
    Release = 0x02,
    ClearAll = 0x03,
    MouseMoveRel = 0x04,
    MouseLeftClick = 0x05,
    MouseRightClick = 0x06,
    MouseDoubleClick = 0x07,
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Opcode::Press),
            0x02 => Ok(Opcode::Release),
            0x03 => Ok(Opcode::ClearAll),
            0x04 => Ok(Opcode::MouseMoveRel),
            0x05 => Ok(Opcode::MouseLeftClick),
            0x06 => Ok(Opcode::MouseRightClick),
            0x07 => Ok(Opcode::MouseDoubleClick),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

/// One logical device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Press(PhysicalKey),
    Release(PhysicalKey),
    /// Device-side hard reset: the firmware releases every key it holds.
    ClearAll,
    MouseMoveRel {
        dx: i16,
        dy: i16,
        duration_ms: i16,
    },
    MouseLeftClick,
    MouseRightClick,
    MouseDoubleClick,
}

impl Frame {
    /// Builds a relative mouse move, clamping every field into its wire range.
    ///
    /// `dx`/`dy` saturate at the `i16` bounds and `duration_ms` is clamped to
    /// `[MIN_MOVE_DURATION_MS, MAX_MOVE_DURATION_MS]`.
    pub fn mouse_move(dx: i64, dy: i64, duration_ms: i64) -> Self {
        Frame::MouseMoveRel {
            dx: saturate_i16(dx),
            dy: saturate_i16(dy),
            duration_ms: duration_ms
                .clamp(MIN_MOVE_DURATION_MS as i64, MAX_MOVE_DURATION_MS as i64)
                as i16,
        }
    }

    /// Returns the opcode for this frame.
    pub fn opcode(&self) -> Opcode {
        match self {
            Frame::Press(_) => Opcode::Press,
            Frame::Release(_) => Opcode::Release,
            Frame::ClearAll => Opcode::ClearAll,
            Frame::MouseMoveRel { .. } => Opcode::MouseMoveRel,
            Frame::MouseLeftClick => Opcode::MouseLeftClick,
            Frame::MouseRightClick => Opcode::MouseRightClick,
            Frame::MouseDoubleClick => Opcode::MouseDoubleClick,
        }
    }

    /// Returns the key carried by a press/release frame.
    pub fn key(&self) -> Option<PhysicalKey> {
        match self {
            Frame::Press(k) | Frame::Release(k) => Some(*k),
            _ => None,
        }
    }
}

fn saturate_i16(v: i64) -> i16 {
    v.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Frame`] into its fixed-size wire representation.
///
/// # Examples
///
/// ```rust
/// use hidseq_core::keymap::PhysicalKey;
/// use hidseq_core::protocol::codec::{encode_frame, Frame};
///
/// let bytes = encode_frame(&Frame::Press(PhysicalKey::new(0x61)));
/// assert_eq!(bytes, [0x01, 0x61, 0, 0, 0, 0, 0, 0]);
/// ```
pub fn encode_frame(frame: &Frame) -> [u8; FRAME_SIZE] {
    let mut buf = [0u8; FRAME_SIZE];
    buf[0] = frame.opcode() as u8;
    match frame {
        Frame::Press(key) | Frame::Release(key) => buf[1] = key.code(),
        Frame::MouseMoveRel {
            dx,
            dy,
            duration_ms,
        } => {
            buf[2..4].copy_from_slice(&dx.to_le_bytes());
            buf[4..6].copy_from_slice(&dy.to_le_bytes());
            buf[6..8].copy_from_slice(&duration_ms.to_le_bytes());
        }
        Frame::ClearAll
        | Frame::MouseLeftClick
        | Frame::MouseRightClick
        | Frame::MouseDoubleClick => {}
    }
    buf
}

/// Decodes one [`Frame`] from the beginning of `bytes`.
///
/// The key byte of `CLEAR_ALL` and the unused fields of every other opcode
/// are ignored, mirroring the firmware.
///
/// # Errors
///
/// Returns [`ProtocolError`] if fewer than [`FRAME_SIZE`] bytes are available
/// or the opcode is unknown.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    if bytes.len() < FRAME_SIZE {
        return Err(ProtocolError::InsufficientData(bytes.len()));
    }

    let read_i16 = |at: usize| i16::from_le_bytes([bytes[at], bytes[at + 1]]);

    let frame = match Opcode::try_from(bytes[0])? {
        Opcode::Press => Frame::Press(PhysicalKey::new(bytes[1])),
        Opcode::Release => Frame::Release(PhysicalKey::new(bytes[1])),
        Opcode::ClearAll => Frame::ClearAll,
        Opcode::MouseMoveRel => Frame::MouseMoveRel {
            dx: read_i16(2),
            dy: read_i16(4),
            duration_ms: read_i16(6),
        },
        Opcode::MouseLeftClick => Frame::MouseLeftClick,
        Opcode::MouseRightClick => Frame::MouseRightClick,
        Opcode::MouseDoubleClick => Frame::MouseDoubleClick,
    };
    Ok(frame)
}

/// Splits a byte stream into frames, stopping at the first malformed one.
///
/// # Errors
///
/// Returns the first [`ProtocolError`] encountered; a trailing partial frame is
/// reported as [`ProtocolError::InsufficientData`].
pub fn decode_stream(bytes: &[u8]) -> Result<Vec<Frame>, ProtocolError> {
    bytes.chunks(FRAME_SIZE).map(decode_frame).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
