//! Sequence actions and delay sampling.
//!
//! A sequence is an ordered `Vec<Action>`.  Actions are immutable once built
//! and are matched exhaustively wherever they are executed, so adding a new
//! kind is a compile error at every execution site until it is handled.
//!
//! Actions deserialize from the command library using an internal `type` tag:
//!
//! ```toml
//! actions = [
//!     { type = "press", key = "shift" },
//!     { type = "delay", min_ms = 40, max_ms = 80 },
//!     { type = "mouse_move_abs", x = 960, y = 540, duration_ms = 120 },
//!     { type = "mouse_click", button = "left" },
//!     { type = "release_all" },
//! ]
//! ```

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default duration of a mouse movement when the profile omits it.
pub const DEFAULT_MOVE_DURATION_MS: u32 = 100;

/// Error returned when a delay range cannot be sampled.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid delay range: min {min_ms} ms is greater than max {max_ms} ms")]
pub struct DelayRangeError {
    pub min_ms: u64,
    pub max_ms: u64,
}

/// How the coordinates of a [`Action::MouseMoveAbs`] are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveMode {
    /// `x`/`y` are screen coordinates; the delta is computed from the current
    /// cursor position.
    #[default]
    Absolute,
    /// `x`/`y` are already the delta to move by.
    Relative,
}

/// Mouse click kinds supported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Double,
}

/// One step of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Press and hold a key.
    Press {
        key: String,
        #[serde(default)]
        force: bool,
    },
    /// Release a key held by this sequence.
    Release {
        key: String,
        #[serde(default)]
        force: bool,
    },
    /// Release every key held by this sequence.
    ReleaseAll {
        #[serde(default)]
        force: bool,
    },
    /// Wait before the next step.
    Delay { min_ms: u64, max_ms: u64 },
    /// Move the pointer over `duration_ms`.
    MouseMoveAbs {
        x: i32,
        y: i32,
        #[serde(default = "default_move_duration")]
        duration_ms: u32,
        #[serde(default)]
        mode: MoveMode,
    },
    /// Click a mouse button.
    MouseClick { button: MouseButton },
}

fn default_move_duration() -> u32 {
    DEFAULT_MOVE_DURATION_MS
}

impl Action {
    /// Shorthand for a non-forced press.
    pub fn press(key: impl Into<String>) -> Self {
        Action::Press {
            key: key.into(),
            force: false,
        }
    }

    /// Shorthand for a non-forced release.
    pub fn release(key: impl Into<String>) -> Self {
        Action::Release {
            key: key.into(),
            force: false,
        }
    }

    /// Shorthand for a fixed or ranged delay.
    pub fn delay(min_ms: u64, max_ms: u64) -> Self {
        Action::Delay { min_ms, max_ms }
    }

    /// Returns `true` if this action moves the pointer.
    pub fn is_mouse_move(&self) -> bool {
        matches!(self, Action::MouseMoveAbs { .. })
    }

    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Press { .. } => "press",
            Action::Release { .. } => "release",
            Action::ReleaseAll { .. } => "release_all",
            Action::Delay { .. } => "delay",
            Action::MouseMoveAbs { .. } => "mouse_move_abs",
            Action::MouseClick { .. } => "mouse_click",
        }
    }
}

/// Returns `true` if any step of `actions` moves the pointer, which means the
/// run must hold the pointer-precision guard.
pub fn requires_pointer_guard(actions: &[Action]) -> bool {
    actions.iter().any(Action::is_mouse_move)
}

/// Picks the duration of a `Delay{min_ms, max_ms}` step.
///
/// - `min == max`: exactly that value.
/// - otherwise: drawn from a Normal distribution with mean `(min+max)/2` and
///   standard deviation `(max-min)/6`, rounded and clamped to `[min, max]`.
///
/// # Errors
///
/// Returns [`DelayRangeError`] when `min_ms > max_ms`.
pub fn sample_delay_ms<R: Rng + ?Sized>(
    min_ms: u64,
    max_ms: u64,
    rng: &mut R,
) -> Result<u64, DelayRangeError> {
    if min_ms > max_ms {
        return Err(DelayRangeError { min_ms, max_ms });
    }
    if min_ms == max_ms {
        return Ok(min_ms);
    }

    let (min, max) = (min_ms as f64, max_ms as f64);
    let mean = (min + max) / 2.0;
    let std_dev = (max - min) / 6.0;
    // std_dev is strictly positive and finite here, so construction cannot fail;
    // fall back to the mean rather than panic if it ever does.
    let sampled = match Normal::new(mean, std_dev) {
        Ok(normal) => normal.sample(rng),
        Err(_) => mean,
    };
    Ok(sampled.round().clamp(min, max) as u64)
}
