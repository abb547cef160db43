//! Live execution state of one sequence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hidseq_core::{requires_pointer_guard, Action, Owner};
use uuid::Uuid;

/// Default watchdog interval.
pub const DEFAULT_WATCHDOG_MS: u64 = 5000;

/// Default number of automatic restarts after the watchdog fires.
pub const DEFAULT_MAX_RECOVERY_ATTEMPTS: u32 = 2;

/// Default (and minimum) pause between two steps.
pub const DEFAULT_MIN_STEP_DELAY_MS: u64 = 1;

/// Tunables shared by both executors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// A run that makes no step progress for this long is considered stuck.
    pub watchdog: Duration,
    /// How many times a stuck run is restarted before it is given up.
    pub max_recovery_attempts: u32,
    /// Floor for the pause between steps.
    pub min_step_delay: Duration,
    /// Fixed RNG seed for delay sampling; `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            watchdog: Duration::from_millis(DEFAULT_WATCHDOG_MS),
            max_recovery_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
            min_step_delay: Duration::from_millis(DEFAULT_MIN_STEP_DELAY_MS),
            rng_seed: None,
        }
    }
}

/// Caller-supplied metadata for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// Command name; unnamed runs are never auto-recovered.
    pub command: Option<String>,
    /// Opaque reason forwarded into logs and the completion event.
    pub reason: Option<String>,
    /// Which component asked for the run (e.g. a detector name).
    pub source_tag: Option<String>,
    /// Test/one-shot runs fail instead of recovering when stuck.
    pub one_shot: bool,
}

impl RunRequest {
    pub fn named(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_source(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = Some(tag.into());
        self
    }

    pub fn one_shot(mut self) -> Self {
        self.one_shot = true;
        self
    }
}

/// Completion notification, fired exactly once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceCompleted {
    pub command: Option<String>,
    pub reason: Option<String>,
    pub success: bool,
}

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Running,
    /// Watchdog fired; keys are being force-released.
    Stuck,
    /// Restarting from the first step after a watchdog.
    Recovering,
}

/// Mutable execution state of one sequence.
#[derive(Debug)]
pub struct SequenceRun {
    pub(crate) id: Uuid,
    pub(crate) owner: Owner,
    pub(crate) actions: Arc<[Action]>,
    pub(crate) request: RunRequest,
    pub(crate) index: usize,
    pub(crate) phase: RunPhase,
    pub(crate) processing: bool,
    pub(crate) next_step_at: Instant,
    pub(crate) watchdog_at: Instant,
    pub(crate) recovery_attempts: u32,
    pub(crate) guard_tag: Option<String>,
}

impl SequenceRun {
    /// Creates a run whose first step is due at `now`.
    pub(crate) fn new(
        owner: Owner,
        actions: Vec<Action>,
        request: RunRequest,
        now: Instant,
        watchdog: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            actions: actions.into(),
            request,
            index: 0,
            phase: RunPhase::Running,
            processing: false,
            next_step_at: now,
            watchdog_at: now + watchdog,
            recovery_attempts: 0,
            guard_tag: None,
        }
    }

    /// Name used in log lines.
    pub fn label(&self) -> &str {
        self.request.command.as_deref().unwrap_or("<unnamed>")
    }

    pub fn command(&self) -> Option<&str> {
        self.request.command.as_deref()
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Index of the next step to execute.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn recovery_attempts(&self) -> u32 {
        self.recovery_attempts
    }

    /// Returns `true` if the sequence moves the pointer and so needs the guard.
    pub(crate) fn needs_guard(&self) -> bool {
        requires_pointer_guard(&self.actions)
    }

    /// Tag this run holds the resource guard under.
    pub(crate) fn guard_key(&self) -> String {
        format!("{}#{}", self.owner, self.id)
    }

    /// Returns the action at the current index, if any remain.
    pub(crate) fn current_action(&self) -> Option<&Action> {
        self.actions.get(self.index)
    }

    /// Re-arms the watchdog after a step that scheduled the next one at `next`.
    pub(crate) fn schedule(&mut self, next: Instant, watchdog: Duration) {
        self.next_step_at = next;
        self.watchdog_at = next + watchdog;
    }

    /// Rewinds to the first step, keeping the action list and recovery count.
    pub(crate) fn rewind(&mut self, now: Instant, watchdog: Duration) {
        self.index = 0;
        self.processing = false;
        self.phase = RunPhase::Running;
        self.schedule(now, watchdog);
    }

    /// Earliest instant at which this run needs attention.
    pub(crate) fn next_deadline(&self) -> Instant {
        self.next_step_at.min(self.watchdog_at)
    }

    pub(crate) fn completion(&self, success: bool) -> SequenceCompleted {
        SequenceCompleted {
            command: self.request.command.clone(),
            reason: self.request.reason.clone(),
            success,
        }
    }
}
