//! The sequential lane: exactly one run at a time.
//!
//! ```text
//! Idle ──start──▶ Running ──last step──▶ Completed (success)
//!                   │  ▲
//!          watchdog │  │ restart (bounded)
//!                   ▼  │
//!                 Stuck ─▶ Recovering ──attempts exhausted──▶ Aborted
//! ```
//!
//! Starting a new run always tears the previous one down first, so the new
//! run's first step never executes while the old run still holds keys.

use std::time::Instant;

use hidseq_core::{Action, Owner};
use tracing::{info, warn};

use super::context::{EngineContext, RunStatus};
use super::run::{RunRequest, SequenceRun};

/// Executor for the single sequential lane.
#[derive(Debug, Default)]
pub struct SequentialExecutor {
    current: Option<SequenceRun>,
}

impl SequentialExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `actions` on the sequential lane.
    ///
    /// - Same command already running: treated as a retry, the old run is
    ///   force-released and reports failure.
    /// - A different run is active: it is aborted gracefully and reports
    ///   failure.
    ///
    /// Returns `false` if the pointer guard could not be acquired; a failure
    /// completion has then already been queued and no key was touched.
    pub fn start(
        &mut self,
        ctx: &mut EngineContext,
        actions: Vec<Action>,
        request: RunRequest,
        now: Instant,
    ) -> bool {
        if let Some(old) = self.current.take() {
            let same_command = old.command().is_some() && old.command() == request.command.as_deref();
            if same_command {
                warn!(command = old.label(), "sequence re-requested while running, restarting");
                ctx.finish(old, false, true, now);
            } else {
                warn!(
                    old = old.label(),
                    new = request.command.as_deref().unwrap_or("<unnamed>"),
                    "preempting running sequence"
                );
                ctx.finish(old, false, false, now);
            }
        }

        let mut run = SequenceRun::new(
            Owner::sequential(),
            actions,
            request,
            now,
            ctx.settings().watchdog,
        );
        if !ctx.begin(&mut run) {
            ctx.finish(run, false, true, now);
            return false;
        }

        info!(
            command = run.label(),
            reason = run.request.reason.as_deref(),
            source = run.request.source_tag.as_deref(),
            steps = run.actions.len(),
            run_id = %run.id,
            "sequence started"
        );
        self.current = Some(run);
        true
    }

    /// Aborts the active run, if any.
    ///
    /// Returns `true` if a run was aborted.
    pub fn abort(&mut self, ctx: &mut EngineContext, force: bool, now: Instant) -> bool {
        match self.current.take() {
            Some(run) => {
                ctx.finish(run, false, force, now);
                true
            }
            None => false,
        }
    }

    /// Advances the active run by at most one step.
    pub fn tick(&mut self, ctx: &mut EngineContext, now: Instant) {
        let Some(run) = self.current.as_mut() else {
            return;
        };
        let status = ctx.drive(run, now);
        if status == RunStatus::Active {
            return;
        }
        if let Some(run) = self.current.take() {
            ctx.finish(run, status == RunStatus::Completed, true, now);
        }
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.current.as_ref().map(SequenceRun::next_deadline)
    }

    pub fn current(&self) -> Option<&SequenceRun> {
        self.current.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
