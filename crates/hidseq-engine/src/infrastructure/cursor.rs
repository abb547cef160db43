//! Dead-reckoning cursor position.
//!
//! The HID emulator cannot report where the pointer is, so the engine tracks
//! it itself: it starts from a known position (configured, or the screen
//! centre after a game recentres the cursor) and adds every relative move it
//! sends.  Without a starting point the position is unknown and absolute
//! moves are skipped.

use crate::application::device::CursorProvider;

/// Cursor position tracked from the moves the engine itself sent.
#[derive(Debug, Clone, Default)]
pub struct DeadReckoningCursor {
    position: Option<(i32, i32)>,
}

impl DeadReckoningCursor {
    /// Starts with an unknown position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts at a known position.
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            position: Some((x, y)),
        }
    }
}

impl CursorProvider for DeadReckoningCursor {
    fn position(&self) -> Option<(i32, i32)> {
        self.position
    }

    fn moved_by(&mut self, dx: i32, dy: i32) {
        if let Some((x, y)) = self.position {
            self.position = Some((x.saturating_add(dx), y.saturating_add(dy)));
        }
    }
}
