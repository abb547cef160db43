//! Key ownership registry: per-owner held-key sets plus a global reference
//! count per physical key.
//!
//! # Why reference counting? (for beginners)
//!
//! Several sequences can run at once, and two of them may both want the same
//! key held down (for example Shift).  If each sequence simply sent its own
//! press/release, the first one to finish would release Shift while the other
//! still needs it.
//!
//! The registry therefore tracks two things:
//!
//! - **Who** holds each key: `Owner → {PhysicalKey}`.
//! - **How many** owners hold each key: `PhysicalKey → count`.
//!
//! The physical device only sees a `PRESS` when the count goes 0→1 and a
//! `RELEASE` when it returns to 0.  In between, owners come and go without
//! touching the wire.
//!
//! # Invariant
//!
//! After every public method returns:
//!
//! ```text
//! count[k] == number of owners whose set contains k     (for every key k)
//! ```
//!
//! Keys with a count of zero are absent from the count map, and owners with
//! an empty set are absent from the owner map, so nothing leaks when dynamic
//! owners (one per parallel command) finish.
//!
//! # Forced release
//!
//! A forced release of a key the caller does *not* hold is a hard reset for
//! that key: it is removed from every owner and the device is told to release
//! it unconditionally.  This is the escape hatch used by recovery when the
//! bookkeeping has drifted from the device.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::keymap::PhysicalKey;
use crate::protocol::codec::Frame;

const SEQUENTIAL_OWNER: &str = "sequential";
const PARALLEL_PREFIX: &str = "parallel::";

/// Identity that holds keys: the sequential lane or one parallel command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Owner(String);

impl Owner {
    /// The reserved identity of the sequential lane.
    pub fn sequential() -> Self {
        Self(SEQUENTIAL_OWNER.to_string())
    }

    /// The identity of the parallel run for `command`.
    pub fn parallel(command: &str) -> Self {
        Self(format!("{PARALLEL_PREFIX}{command}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for owners created by [`Owner::parallel`].
    pub fn is_parallel(&self) -> bool {
        self.0.starts_with(PARALLEL_PREFIX)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a press or release request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyChange {
    /// Nothing was done: the key was already held (press) or not held (release).
    Ignored,
    /// Bookkeeping changed but the device state stays as it is.
    Tracked,
    /// Bookkeeping changed and `Frame` must be written to the device.
    Emit(Frame),
}

impl KeyChange {
    /// Returns `true` if the request was acted on.
    pub fn taken(&self) -> bool {
        !matches!(self, KeyChange::Ignored)
    }

    /// Returns the frame to write, if any.
    pub fn frame(&self) -> Option<Frame> {
        match self {
            KeyChange::Emit(frame) => Some(*frame),
            _ => None,
        }
    }
}

/// Per-owner key sets plus global per-key reference counts.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    held: HashMap<Owner, BTreeSet<PhysicalKey>>,
    counts: HashMap<PhysicalKey, u32>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `owner` presses `key`.
    ///
    /// A non-forced press of a key `owner` already holds is ignored.  A forced
    /// press always emits a `PRESS` frame; it only bumps the global count when
    /// the key is newly added to the owner's set.
    pub fn press(&mut self, owner: &Owner, key: PhysicalKey, force: bool) -> KeyChange {
        let set = self.held.entry(owner.clone()).or_default();
        if !force && set.contains(&key) {
            return KeyChange::Ignored;
        }

        let newly_held = set.insert(key);
        let count = self.counts.entry(key).or_insert(0);
        let was_up = *count == 0;
        if newly_held {
            *count += 1;
        }

        if force || was_up {
            KeyChange::Emit(Frame::Press(key))
        } else {
            KeyChange::Tracked
        }
    }

    /// Records that `owner` releases `key`.
    ///
    /// - Held by `owner`: removed, count decremented, `RELEASE` emitted only
    ///   when no other owner still holds the key.
    /// - Not held and `force`: the key is cleared from every owner, its count
    ///   is zeroed and `RELEASE` is emitted unconditionally.
    /// - Not held and not forced: ignored; the caller decides whether to
    ///   escalate to a forced release.
    pub fn release(&mut self, owner: &Owner, key: PhysicalKey, force: bool) -> KeyChange {
        let removed = match self.held.get_mut(owner) {
            Some(set) => set.remove(&key),
            None => false,
        };

        if removed {
            self.prune_owner(owner);
            return if self.decrement(key) == 0 {
                KeyChange::Emit(Frame::Release(key))
            } else {
                KeyChange::Tracked
            };
        }

        if !force {
            return KeyChange::Ignored;
        }

        for set in self.held.values_mut() {
            set.remove(&key);
        }
        self.held.retain(|_, set| !set.is_empty());
        self.counts.remove(&key);
        KeyChange::Emit(Frame::Release(key))
    }

    /// Releases every key `owner` holds and forgets the owner.
    ///
    /// Returns the frames to write, in key order.
    pub fn release_all(&mut self, owner: &Owner, force: bool) -> Vec<Frame> {
        let keys: Vec<PhysicalKey> = self
            .held
            .get(owner)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        let frames = keys
            .into_iter()
            .filter_map(|key| self.release(owner, key, force).frame())
            .collect();
        self.held.remove(owner);
        frames
    }

    /// Forgets all bookkeeping.  Used after the device received `CLEAR_ALL`.
    pub fn clear(&mut self) {
        self.held.clear();
        self.counts.clear();
    }

    /// Returns the keys `owner` currently holds.
    pub fn held_by(&self, owner: &Owner) -> Vec<PhysicalKey> {
        self.held
            .get(owner)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if `owner` holds `key`.
    pub fn holds(&self, owner: &Owner, key: PhysicalKey) -> bool {
        self.held.get(owner).is_some_and(|set| set.contains(&key))
    }

    /// Number of owners holding `key`.
    pub fn global_count(&self, key: PhysicalKey) -> u32 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    /// Returns `true` if no key is held by anyone.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty() && self.held.is_empty()
    }

    /// Number of owners that currently hold at least one key.
    pub fn owner_count(&self) -> usize {
        self.held.len()
    }

    /// Checks the reference-count invariant against the owner sets.
    pub fn is_consistent(&self) -> bool {
        let mut expected: HashMap<PhysicalKey, u32> = HashMap::new();
        for set in self.held.values() {
            for key in set {
                *expected.entry(*key).or_insert(0) += 1;
            }
        }
        expected == self.counts
    }

    fn decrement(&mut self, key: PhysicalKey) -> u32 {
        let remaining = match self.counts.get_mut(&key) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            self.counts.remove(&key);
        }
        remaining
    }

    fn prune_owner(&mut self, owner: &Owner) {
        if self.held.get(owner).is_some_and(BTreeSet::is_empty) {
            self.held.remove(owner);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
