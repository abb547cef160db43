//! Echo suppression for the passive keyboard listener.
//!
//! Every key transition the engine writes to the device comes back through the
//! OS as an ordinary key event.  A passive listener that watches the real
//! keyboard would otherwise mistake those echoes for user input and could
//! re-trigger automation.  The engine records when it last sent each key; the
//! listener asks [`EchoLedger::is_echo`] before folding an event into the
//! observed state.
//!
//! The ledger is shared between the engine and the listener thread, so it
//! guards its map with a `Mutex` and all methods take `&self`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::keymap::PhysicalKey;

/// Default echo window.
pub const DEFAULT_ECHO_IGNORE_MS: u64 = 30;

/// Last-sent timestamp per key.
#[derive(Debug)]
pub struct EchoLedger {
    window: Duration,
    last_sent: Mutex<HashMap<PhysicalKey, Instant>>,
}

impl EchoLedger {
    /// Creates a ledger that treats events within `window` of a send as echoes.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records that a press or release for `key` was written at `at`.
    pub fn record_sent(&self, key: PhysicalKey, at: Instant) {
        self.lock().insert(key, at);
    }

    /// Returns `true` if an event for `key` observed at `observed_at` lies
    /// within the echo window of the last recorded send.
    ///
    /// Listener timestamps may trail or slightly precede the engine's, so the
    /// distance is measured in both directions.
    pub fn is_echo(&self, key: PhysicalKey, observed_at: Instant) -> bool {
        let Some(sent) = self.lock().get(&key).copied() else {
            return false;
        };
        let distance = if observed_at >= sent {
            observed_at - sent
        } else {
            sent - observed_at
        };
        distance <= self.window
    }

    /// Forgets every recorded send.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PhysicalKey, Instant>> {
        self.last_sent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EchoLedger {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_ECHO_IGNORE_MS))
    }
}

/// Key state as reported by the passive listener, with echoes removed.
#[derive(Debug, Default)]
pub struct ObservedKeyState {
    pressed: HashSet<PhysicalKey>,
    dropped_echoes: u64,
}

impl ObservedKeyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one listener transition into the observed state.
    ///
    /// Returns `false` when the event was classified as an echo and dropped.
    pub fn observe(
        &mut self,
        ledger: &EchoLedger,
        key: PhysicalKey,
        pressed: bool,
        observed_at: Instant,
    ) -> bool {
        if ledger.is_echo(key, observed_at) {
            self.dropped_echoes += 1;
            return false;
        }
        if pressed {
            self.pressed.insert(key);
        } else {
            self.pressed.remove(&key);
        }
        true
    }

    /// Returns `true` if the user is physically holding `key`.
    pub fn is_pressed(&self, key: PhysicalKey) -> bool {
        self.pressed.contains(&key)
    }

    pub fn dropped_echoes(&self) -> u64 {
        self.dropped_echoes
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
