//! Engine facade: routes requests to the sequential or parallel lane and
//! implements the "release all keys" panic path.
//!
//! The engine is a plain synchronous state machine.  It never reads the clock
//! itself; every entry point takes `now`, which keeps it deterministic under
//! test.  [`EngineService`](super::service) supplies real time and the
//! wake-ups.

use std::sync::Arc;
use std::time::Instant;

use hidseq_core::{Action, EchoLedger, KeyRegistry, Owner, PhysicalKey, ResourceToggle};
use tracing::{error, info, warn};

use super::context::EngineContext;
use super::device::{CursorProvider, Transport, TransportError};
use super::parallel::ParallelExecutor;
use super::run::{EngineSettings, RunRequest, SequenceCompleted, SequenceRun};
use super::sequential::SequentialExecutor;

/// Reserved command name that triggers the panic path.
pub const RELEASE_ALL_COMMAND: &str = "release all keys";

/// The key sequencing engine.
pub struct Engine {
    ctx: EngineContext,
    sequential: SequentialExecutor,
    parallel: ParallelExecutor,
}

impl Engine {
    pub fn new(
        transport: Box<dyn Transport>,
        toggle: Box<dyn ResourceToggle>,
        cursor: Box<dyn CursorProvider>,
        ledger: Arc<EchoLedger>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            ctx: EngineContext::new(transport, toggle, cursor, ledger, settings),
            sequential: SequentialExecutor::new(),
            parallel: ParallelExecutor::new(),
        }
    }

    /// Opens the device link.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the device cannot be opened.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        self.ctx.open_transport()?;
        info!("device connected");
        Ok(())
    }

    /// Runs `actions` under `command`.
    ///
    /// `parallel` selects the lane.  The reserved [`RELEASE_ALL_COMMAND`]
    /// ignores `actions` and fires the panic path instead.
    pub fn execute(
        &mut self,
        command: &str,
        actions: Vec<Action>,
        reason: Option<String>,
        parallel: bool,
        now: Instant,
    ) -> bool {
        let request = RunRequest {
            command: Some(command.to_string()),
            reason,
            ..RunRequest::default()
        };
        self.submit(actions, request, parallel, now)
    }

    /// Runs `actions` with full request metadata.
    ///
    /// Returns `false` if the run was refused.  A refused run has already
    /// queued its failure completion.
    pub fn submit(&mut self, actions: Vec<Action>, request: RunRequest, parallel: bool, now: Instant) -> bool {
        if request.command.as_deref() == Some(RELEASE_ALL_COMMAND) {
            self.release_all_keys(now);
            return true;
        }

        if !parallel {
            return self.sequential.start(&mut self.ctx, actions, request, now);
        }

        match request.command.clone() {
            Some(command) => self.parallel.start(&mut self.ctx, &command, actions, request, now),
            None => {
                error!("parallel sequence submitted without a command name, refusing");
                self.ctx.push_completion(SequenceCompleted {
                    command: None,
                    reason: request.reason,
                    success: false,
                });
                false
            }
        }
    }

    /// Stops the run for `command` on whichever lane it is on.
    ///
    /// Returns `true` if a run was stopped.
    pub fn stop(&mut self, command: &str, forced: bool, now: Instant) -> bool {
        if self.parallel.stop(&mut self.ctx, command, forced, now) {
            return true;
        }
        let on_sequential = self
            .sequential
            .current()
            .is_some_and(|run| run.command() == Some(command));
        on_sequential && self.sequential.abort(&mut self.ctx, forced, now)
    }

    /// Panic button: tears down every run and hard-resets the device.
    ///
    /// Every parallel run is force-stopped, the sequential run is aborted, and
    /// one `CLEAR_ALL` frame is sent.  Afterwards the registry is empty.
    pub fn release_all_keys(&mut self, now: Instant) {
        warn!(
            parallel = self.parallel.len(),
            sequential = self.sequential.is_running(),
            "releasing all keys"
        );
        self.parallel.stop_all(&mut self.ctx, true, now);
        self.sequential.abort(&mut self.ctx, true, now);
        self.ctx.release_all(&Owner::sequential(), true, now);
        self.ctx.clear_device(now);
    }

    /// Advances every lane by at most one step per run.
    pub fn tick(&mut self, now: Instant) {
        self.sequential.tick(&mut self.ctx, now);
        self.parallel.tick(&mut self.ctx, now);
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.sequential.next_deadline(), self.parallel.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drains the completion events queued since the last call.
    pub fn take_completions(&mut self) -> Vec<SequenceCompleted> {
        self.ctx.take_completions()
    }

    /// Releases everything, restores the pointer guard and closes the link.
    pub fn shutdown(&mut self, now: Instant) {
        info!("engine shutting down");
        self.release_all_keys(now);
        self.ctx.drain_guard();
        self.ctx.close_transport();
    }

    // ── Introspection ────────────────────────────────────────────────────────

    pub fn registry(&self) -> &KeyRegistry {
        self.ctx.registry()
    }

    pub fn guard_refcount(&self) -> u32 {
        self.ctx.guard().refcount()
    }

    /// Shared echo ledger for the passive keyboard listener.
    pub fn ledger(&self) -> Arc<EchoLedger> {
        Arc::clone(self.ctx.ledger())
    }

    /// Returns `true` if an observed event for `key` is one the engine caused.
    pub fn is_echo(&self, key: PhysicalKey, observed_at: Instant) -> bool {
        self.ctx.ledger().is_echo(key, observed_at)
    }

    pub fn sequential_run(&self) -> Option<&SequenceRun> {
        self.sequential.current()
    }

    pub fn parallel_run(&self, command: &str) -> Option<&SequenceRun> {
        self.parallel.get(command)
    }

    pub fn parallel_commands(&self) -> Vec<&str> {
        self.parallel.commands()
    }

    /// Returns `true` when no run is active on any lane.
    pub fn is_idle(&self) -> bool {
        !self.sequential.is_running() && self.parallel.is_empty()
    }
}
