//! Parallel lanes: any number of independently named runs.
//!
//! Each run owns `parallel::<command>` in the key registry, so two parallel
//! commands pressing the same key share it through the global refcount
//! rather than cutting each other off.

use std::collections::BTreeMap;
use std::time::Instant;

use hidseq_core::{Action, Owner};
use tracing::{info, warn};

use super::context::{EngineContext, RunStatus};
use super::run::{RunRequest, SequenceRun};

/// Table of active parallel runs keyed by command name.
#[derive(Debug, Default)]
pub struct ParallelExecutor {
    runs: BTreeMap<String, SequenceRun>,
}

impl ParallelExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `actions` as the parallel run for `command`.
    ///
    /// An existing run under the same name is force-stopped first.  Returns
    /// `false` if the pointer guard could not be acquired.
    pub fn start(
        &mut self,
        ctx: &mut EngineContext,
        command: &str,
        actions: Vec<Action>,
        mut request: RunRequest,
        now: Instant,
    ) -> bool {
        if let Some(old) = self.runs.remove(command) {
            warn!(command, "parallel command re-requested while running, replacing");
            ctx.finish(old, false, true, now);
        }

        request.command = Some(command.to_string());
        let mut run = SequenceRun::new(
            Owner::parallel(command),
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
            command,
            reason = run.request.reason.as_deref(),
            source = run.request.source_tag.as_deref(),
            steps = run.actions.len(),
            run_id = %run.id,
            active = self.runs.len() + 1,
            "parallel sequence started"
        );
        self.runs.insert(command.to_string(), run);
        true
    }

    /// Stops the run for `command` and reports it as failed.
    ///
    /// Returns `false` if no such run is active.
    pub fn stop(&mut self, ctx: &mut EngineContext, command: &str, forced: bool, now: Instant) -> bool {
        match self.runs.remove(command) {
            Some(run) => {
                info!(command, forced, "stopping parallel sequence");
                ctx.finish(run, false, forced, now);
                true
            }
            None => false,
        }
    }

    /// Stops every active run.  Returns how many were stopped.
    pub fn stop_all(&mut self, ctx: &mut EngineContext, forced: bool, now: Instant) -> usize {
        let runs = std::mem::take(&mut self.runs);
        let stopped = runs.len();
        for (_, run) in runs {
            ctx.finish(run, false, forced, now);
        }
        if stopped > 0 {
            warn!(stopped, forced, "stopped all parallel sequences");
        }
        stopped
    }

    /// Advances every run by at most one step, in command-name order.
    pub fn tick(&mut self, ctx: &mut EngineContext, now: Instant) {
        let mut ended = Vec::new();
        for (command, run) in self.runs.iter_mut() {
            match ctx.drive(run, now) {
                RunStatus::Active => {}
                RunStatus::Completed => ended.push((command.clone(), true)),
                RunStatus::Failed => ended.push((command.clone(), false)),
            }
        }
        for (command, success) in ended {
            if let Some(run) = self.runs.remove(&command) {
                ctx.finish(run, success, true, now);
            }
        }
    }

    /// Earliest instant at which any run has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.runs.values().map(SequenceRun::next_deadline).min()
    }

    pub fn is_running(&self, command: &str) -> bool {
        self.runs.contains_key(command)
    }

    pub fn get(&self, command: &str) -> Option<&SequenceRun> {
        self.runs.get(command)
    }

    /// Names of the active runs, sorted.
    pub fn commands(&self) -> Vec<&str> {
        self.runs.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
