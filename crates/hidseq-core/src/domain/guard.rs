//! Reference-counted guard around one exclusive external toggle.
//!
//! Pointer movement on the game client is only predictable with the OS
//! pointer-precision setting switched off.  Any number of runs may need it
//! off at the same time, so the guard counts holders: the first acquire turns
//! the setting off, the last release restores it.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

/// Requested state of the external toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    /// Switch the resource off for automation.
    Off,
    /// Put the user's original setting back.
    Restore,
}

impl ToggleState {
    /// Argument passed to the toggle program.
    pub fn as_arg(self) -> &'static str {
        match self {
            ToggleState::Off => "off",
            ToggleState::Restore => "restore",
        }
    }
}

/// Errors reported by a [`ResourceToggle`].
#[derive(Debug, Error)]
pub enum ToggleError {
    /// The toggle program could not be started.
    #[error("failed to run toggle program: {0}")]
    Spawn(String),
    /// The toggle program exited unsuccessfully.
    #[error("toggle program exited with status {0:?}")]
    ExitStatus(Option<i32>),
}

/// External switch the guard drives.
///
/// The production implementation runs a configured program; tests record calls.
pub trait ResourceToggle: Send {
    /// Puts the resource into `state`.
    ///
    /// # Errors
    ///
    /// Returns [`ToggleError`] if the switch could not be applied.
    fn toggle(&self, state: ToggleState) -> Result<(), ToggleError>;
}

/// Lets a caller keep a handle on a toggle it hands to the guard.
impl<T: ResourceToggle + Sync + ?Sized> ResourceToggle for Arc<T> {
    fn toggle(&self, state: ToggleState) -> Result<(), ToggleError> {
        (**self).toggle(state)
    }
}

/// Refcount plus the tags currently holding the resource.
pub struct ResourceGuard {
    toggle: Box<dyn ResourceToggle>,
    refcount: u32,
    holders: BTreeMap<String, u32>,
}

impl ResourceGuard {
    pub fn new(toggle: Box<dyn ResourceToggle>) -> Self {
        Self {
            toggle,
            refcount: 0,
            holders: BTreeMap::new(),
        }
    }

    /// Acquires the resource for `tag`.
    ///
    /// The first holder switches the toggle off.  If that fails, nothing is
    /// recorded and `false` is returned.
    pub fn acquire(&mut self, tag: &str) -> bool {
        if self.refcount == 0 {
            if let Err(e) = self.toggle.toggle(ToggleState::Off) {
                warn!(tag, "resource guard acquire failed: {e}");
                return false;
            }
            info!(tag, "resource guard engaged");
        }
        self.refcount += 1;
        *self.holders.entry(tag.to_string()).or_insert(0) += 1;
        debug!(tag, refcount = self.refcount, "resource guard acquired");
        true
    }

    /// Releases one hold of `tag`.
    ///
    /// Releasing a tag that holds nothing is ignored, so the refcount never
    /// goes negative and a run cannot release on behalf of another.  The last
    /// release restores the toggle; a restore failure is logged and the guard
    /// still drops to zero.
    pub fn release(&mut self, tag: &str) {
        let Some(count) = self.holders.get_mut(tag) else {
            debug!(tag, "resource guard release ignored: tag holds nothing");
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.holders.remove(tag);
        }

        if self.refcount > 0 {
            self.refcount -= 1;
        }
        debug!(tag, refcount = self.refcount, "resource guard released");

        if self.refcount == 0 {
            self.restore();
        }
    }

    /// Releases every outstanding hold.  Used on shutdown.
    pub fn drain(&mut self) {
        if self.refcount == 0 {
            return;
        }
        warn!(
            refcount = self.refcount,
            holders = ?self.holders.keys().collect::<Vec<_>>(),
            "draining resource guard"
        );
        self.refcount = 0;
        self.holders.clear();
        self.restore();
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    pub fn is_held_by(&self, tag: &str) -> bool {
        self.holders.contains_key(tag)
    }

    fn restore(&mut self) {
        match self.toggle.toggle(ToggleState::Restore) {
            Ok(()) => info!("resource guard released; toggle restored"),
            Err(e) => warn!("failed to restore toggle: {e}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingToggle {
        calls: Arc<Mutex<Vec<ToggleState>>>,
        fail_off: bool,
    }

    impl ResourceToggle for RecordingToggle {
        fn toggle(&self, state: ToggleState) -> Result<(), ToggleError> {
            if self.fail_off && state == ToggleState::Off {
                return Err(ToggleError::ExitStatus(Some(1)));
            }
            self.calls.lock().unwrap().push(state);
            Ok(())
        }
    }

    fn make_guard(fail_off: bool) -> (ResourceGuard, Arc<Mutex<Vec<ToggleState>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let toggle = RecordingToggle {
            calls: Arc::clone(&calls),
            fail_off,
        };
        (ResourceGuard::new(Box::new(toggle)), calls)
    }

    #[test]
    fn test_first_acquire_switches_off_and_last_release_restores() {
        // Arrange
        let (mut guard, calls) = make_guard(false);

        // Act
        assert!(guard.acquire("a"));
        assert!(guard.acquire("b"));
        guard.release("a");
        let mid = calls.lock().unwrap().clone();
        guard.release("b");

        // Assert
        assert_eq!(mid, vec![ToggleState::Off]);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![ToggleState::Off, ToggleState::Restore]
        );
        assert_eq!(guard.refcount(), 0);
    }

    #[test]
    fn test_shared_toggle_handle_sees_guard_calls() {
        // Arrange
        let toggle = Arc::new(RecordingToggle::default());
        let mut guard = ResourceGuard::new(Box::new(Arc::clone(&toggle)));

        // Act
        guard.acquire("a");
        guard.release("a");

        // Assert
        assert_eq!(
            *toggle.calls.lock().unwrap(),
            vec![ToggleState::Off, ToggleState::Restore]
        );
    }

    #[test]
    fn test_failed_acquire_does_not_increment() {
        let (mut guard, calls) = make_guard(true);

        assert!(!guard.acquire("a"));

        assert_eq!(guard.refcount(), 0);
        assert!(!guard.is_held_by("a"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_release_of_non_holder_never_goes_negative() {
        let (mut guard, calls) = make_guard(false);

        guard.release("ghost");

        assert_eq!(guard.refcount(), 0);
        assert!(calls.lock().unwrap().is_empty(), "no restore without a hold");
    }

    #[test]
    fn test_double_release_by_same_tag_only_counts_once() {
        let (mut guard, _) = make_guard(false);
        guard.acquire("a");
        guard.acquire("b");

        guard.release("a");
        guard.release("a");

        assert_eq!(guard.refcount(), 1);
        assert!(guard.is_held_by("b"));
    }

    #[test]
    fn test_drain_restores_once_and_zeroes() {
        let (mut guard, calls) = make_guard(false);
        guard.acquire("a");
        guard.acquire("b");

        guard.drain();
        guard.drain();

        assert_eq!(guard.refcount(), 0);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![ToggleState::Off, ToggleState::Restore]
        );
    }

    #[test]
    fn test_toggle_state_arguments() {
        assert_eq!(ToggleState::Off.as_arg(), "off");
        assert_eq!(ToggleState::Restore.as_arg(), "restore");
    }
}
