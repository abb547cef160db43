//! Recording toggle for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use hidseq_core::{ResourceToggle, ToggleError, ToggleState};

/// Records every toggle call; can be told to fail the `off` switch.
#[derive(Debug, Default)]
pub struct MockToggle {
    pub calls: Mutex<Vec<ToggleState>>,
    /// When `true`, switching off fails as if the program exited with 1.
    pub fail_off: AtomicBool,
}

impl MockToggle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A toggle whose `off` switch always fails.
    pub fn failing() -> Self {
        let toggle = Self::default();
        toggle.fail_off.store(true, Ordering::SeqCst);
        toggle
    }

    pub fn calls(&self) -> Vec<ToggleState> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ResourceToggle for MockToggle {
    fn toggle(&self, state: ToggleState) -> Result<(), ToggleError> {
        if state == ToggleState::Off && self.fail_off.load(Ordering::SeqCst) {
            return Err(ToggleError::ExitStatus(Some(1)));
        }
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(state);
        Ok(())
    }
}
