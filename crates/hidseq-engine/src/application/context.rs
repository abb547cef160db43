//! Shared state touched by every run: registry, guard, transport and cursor.
//!
//! Both executors drive their runs through [`EngineContext`], so press/release
//! bookkeeping, frame writes, echo recording and watchdog recovery behave
//! identically on the sequential lane and on every parallel lane.  Only the
//! lane semantics (one run vs. a table of named runs) live in the executors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hidseq_core::domain::action::DelayRangeError;
use hidseq_core::{
    encode_frame, resolve_key_name, sample_delay_ms, Action, EchoLedger, Frame, KeyRegistry,
    MouseButton, MoveMode, Owner, PhysicalKey, ResourceGuard, ResourceToggle,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::device::{CursorProvider, Transport, TransportError};
use super::run::{EngineSettings, RunPhase, SequenceCompleted, SequenceRun};

/// Errors that end a run immediately.
///
/// Recoverable problems (unknown key names, write failures) are logged and the
/// step is skipped instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepError {
    #[error(transparent)]
    InvalidDelay(#[from] DelayRangeError),
    #[error("mouse movement requested without holding the pointer guard")]
    GuardNotHeld,
}

/// What the scheduler should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Run the next step after this delay.
    Next(Duration),
    /// The action list is exhausted.
    Finished,
}

/// Result of giving one run a chance to progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunStatus {
    Active,
    Completed,
    Failed,
}

/// Owner of the engine's shared mutable state.
pub struct EngineContext {
    registry: KeyRegistry,
    guard: ResourceGuard,
    transport: Box<dyn Transport>,
    cursor: Box<dyn CursorProvider>,
    ledger: Arc<EchoLedger>,
    rng: StdRng,
    settings: EngineSettings,
    completions: Vec<SequenceCompleted>,
}

impl EngineContext {
    pub fn new(
        transport: Box<dyn Transport>,
        toggle: Box<dyn ResourceToggle>,
        cursor: Box<dyn CursorProvider>,
        ledger: Arc<EchoLedger>,
        settings: EngineSettings,
    ) -> Self {
        let rng = match settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            registry: KeyRegistry::new(),
            guard: ResourceGuard::new(toggle),
            transport,
            cursor,
            ledger,
            rng,
            settings,
            completions: Vec::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    pub fn guard(&self) -> &ResourceGuard {
        &self.guard
    }

    pub fn ledger(&self) -> &Arc<EchoLedger> {
        &self.ledger
    }

    pub(crate) fn open_transport(&mut self) -> Result<(), TransportError> {
        self.transport.open()
    }

    pub(crate) fn close_transport(&mut self) {
        self.transport.close();
    }

    /// Drains queued completion events.
    pub(crate) fn take_completions(&mut self) -> Vec<SequenceCompleted> {
        std::mem::take(&mut self.completions)
    }

    pub(crate) fn push_completion(&mut self, completion: SequenceCompleted) {
        self.completions.push(completion);
    }

    pub(crate) fn drain_guard(&mut self) {
        self.guard.drain();
    }

    // ── Wire ─────────────────────────────────────────────────────────────────

    /// Encodes and writes one frame.
    ///
    /// Key frames that reach the wire are recorded in the echo ledger.  A
    /// failed write triggers one reconnect attempt and the frame is dropped.
    pub(crate) fn write_frame(&mut self, frame: Frame, now: Instant) -> bool {
        match self.transport.write(&encode_frame(&frame)) {
            Ok(()) => {
                if let Some(key) = frame.key() {
                    self.ledger.record_sent(key, now);
                }
                true
            }
            Err(e) => {
                warn!(?frame, "device write failed, reconnecting: {e}");
                if let Err(e) = self.transport.reconnect() {
                    error!("device reconnect failed: {e}");
                }
                false
            }
        }
    }

    /// Registers a press by `owner` and writes the frame if the device needs it.
    pub(crate) fn press(&mut self, owner: &Owner, key: PhysicalKey, force: bool, now: Instant) -> bool {
        let change = self.registry.press(owner, key, force);
        if let Some(frame) = change.frame() {
            self.write_frame(frame, now);
        }
        change.taken()
    }

    /// Registers a release by `owner` and writes the frame if the device needs it.
    pub(crate) fn release(&mut self, owner: &Owner, key: PhysicalKey, force: bool, now: Instant) -> bool {
        let change = self.registry.release(owner, key, force);
        if let Some(frame) = change.frame() {
            self.write_frame(frame, now);
        }
        change.taken()
    }

    /// Releases every key held by `owner`.
    pub(crate) fn release_all(&mut self, owner: &Owner, force: bool, now: Instant) {
        for frame in self.registry.release_all(owner, force) {
            self.write_frame(frame, now);
        }
    }

    /// Sends `CLEAR_ALL` and forgets all key bookkeeping.
    pub(crate) fn clear_device(&mut self, now: Instant) {
        self.write_frame(Frame::ClearAll, now);
        self.registry.clear();
    }

    // ── Run lifecycle ────────────────────────────────────────────────────────

    /// Acquires the pointer guard for `run` if its sequence moves the mouse.
    ///
    /// Returns `false` if the guard could not be acquired; the run must then
    /// not start.
    pub(crate) fn begin(&mut self, run: &mut SequenceRun) -> bool {
        if !run.needs_guard() {
            return true;
        }
        let tag = run.guard_key();
        if !self.guard.acquire(&tag) {
            error!(command = run.label(), "pointer guard unavailable, refusing to start");
            return false;
        }
        run.guard_tag = Some(tag);
        true
    }

    /// Tears `run` down: releases its keys and guard hold, then queues the
    /// completion event.
    pub(crate) fn finish(&mut self, mut run: SequenceRun, success: bool, force: bool, now: Instant) {
        self.release_all(&run.owner, force, now);
        if let Some(tag) = run.guard_tag.take() {
            self.guard.release(&tag);
        }

        if success {
            info!(
                command = run.label(),
                reason = run.request.reason.as_deref(),
                run_id = %run.id,
                "sequence completed"
            );
        } else {
            warn!(
                command = run.label(),
                reason = run.request.reason.as_deref(),
                run_id = %run.id,
                step = run.index,
                "sequence ended without completing"
            );
        }
        self.completions.push(run.completion(success));
    }

    /// Gives `run` one chance to progress at `now`.
    ///
    /// The watchdog is checked before any due step.  At most one step is
    /// executed, and never while a previous step of the same run is still
    /// being processed.
    pub(crate) fn drive(&mut self, run: &mut SequenceRun, now: Instant) -> RunStatus {
        if run.processing {
            debug!(command = run.label(), "step already in progress, tick ignored");
            return RunStatus::Active;
        }

        if now >= run.watchdog_at {
            return if self.recover(run, now) {
                RunStatus::Active
            } else {
                RunStatus::Failed
            };
        }

        if now < run.next_step_at {
            return RunStatus::Active;
        }

        run.processing = true;
        let outcome = self.process_step(run, now);
        run.processing = false;

        match outcome {
            Ok(StepOutcome::Next(delay)) => {
                run.schedule(now + delay, self.settings.watchdog);
                RunStatus::Active
            }
            Ok(StepOutcome::Finished) => RunStatus::Completed,
            Err(e) => {
                error!(command = run.label(), step = run.index, "step failed: {e}");
                RunStatus::Failed
            }
        }
    }

    /// Handles a watchdog expiry.
    ///
    /// Returns `true` if the run was restarted from its first step, `false`
    /// if it must be torn down with a failure completion.
    fn recover(&mut self, run: &mut SequenceRun, now: Instant) -> bool {
        run.phase = RunPhase::Stuck;
        warn!(
            command = run.label(),
            step = run.index,
            watchdog_ms = self.settings.watchdog.as_millis() as u64,
            "sequence stuck, force-releasing its keys"
        );
        self.release_all(&run.owner, true, now);

        if run.request.one_shot || run.request.command.is_none() {
            warn!(command = run.label(), "one-shot or unnamed sequence, not recovering");
            return false;
        }

        run.recovery_attempts += 1;
        if run.recovery_attempts > self.settings.max_recovery_attempts {
            error!(
                command = run.label(),
                attempts = run.recovery_attempts - 1,
                "recovery attempts exhausted"
            );
            return false;
        }

        run.phase = RunPhase::Recovering;
        if let Err(e) = self.transport.reconnect() {
            warn!("device reconnect during recovery failed: {e}");
        }
        info!(
            command = run.label(),
            attempt = run.recovery_attempts,
            source = run.request.source_tag.as_deref(),
            "[retry] restarting sequence from the first step"
        );
        run.rewind(now, self.settings.watchdog);
        true
    }

    /// Executes the action at the run's current index.
    pub(crate) fn process_step(
        &mut self,
        run: &mut SequenceRun,
        now: Instant,
    ) -> Result<StepOutcome, StepError> {
        let actions = Arc::clone(&run.actions);
        let Some(action) = actions.get(run.index) else {
            return Ok(StepOutcome::Finished);
        };
        run.index += 1;
        debug!(command = run.label(), step = run.index - 1, action = action.kind(), "step");

        let min_delay = self.settings.min_step_delay;
        match action {
            Action::Press { key, force } => {
                if let Some(key) = self.resolve(run, key) {
                    self.press(&run.owner, key, *force, now);
                }
            }
            Action::Release { key, force } => {
                if let Some(key) = self.resolve(run, key) {
                    if !self.release(&run.owner, key, *force, now) {
                        debug!(command = run.label(), %key, "release of a key this run does not hold ignored");
                    }
                }
            }
            Action::ReleaseAll { force } => {
                self.release_all(&run.owner, *force, now);
            }
            Action::Delay { min_ms, max_ms } => {
                let ms = sample_delay_ms(*min_ms, *max_ms, &mut self.rng)?;
                return Ok(StepOutcome::Next(Duration::from_millis(ms).max(min_delay)));
            }
            Action::MouseMoveAbs {
                x,
                y,
                duration_ms,
                mode,
            } => {
                if run.guard_tag.is_none() {
                    return Err(StepError::GuardNotHeld);
                }
                let delta = match mode {
                    MoveMode::Relative => Some((*x, *y)),
                    MoveMode::Absolute => self
                        .cursor
                        .position()
                        .map(|(cx, cy)| (x.saturating_sub(cx), y.saturating_sub(cy))),
                };
                let Some((dx, dy)) = delta else {
                    error!(command = run.label(), x, y, "cursor position unknown, mouse move skipped");
                    return Ok(StepOutcome::Next(min_delay));
                };

                let frame = Frame::mouse_move(dx.into(), dy.into(), (*duration_ms).into());
                let Frame::MouseMoveRel { dx, dy, duration_ms } = frame else {
                    return Ok(StepOutcome::Next(min_delay));
                };
                if self.write_frame(frame, now) {
                    self.cursor.moved_by(dx.into(), dy.into());
                }
                let travel = Duration::from_millis(u64::from(duration_ms.unsigned_abs()));
                return Ok(StepOutcome::Next(travel.max(min_delay)));
            }
            Action::MouseClick { button } => {
                let frame = match button {
                    MouseButton::Left => Frame::MouseLeftClick,
                    MouseButton::Right => Frame::MouseRightClick,
                    MouseButton::Double => Frame::MouseDoubleClick,
                };
                self.write_frame(frame, now);
            }
        }
        Ok(StepOutcome::Next(min_delay))
    }

    fn resolve(&self, run: &SequenceRun, name: &str) -> Option<PhysicalKey> {
        let key = resolve_key_name(name);
        if key.is_none() {
            error!(command = run.label(), key = name, "unknown key name, step skipped");
        }
        key
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::device::MockCursorProvider;
    use crate::application::run::RunRequest;
    use crate::infrastructure::toggle::mock::MockToggle;
    use crate::infrastructure::transport::mock::MockTransport;

    const A: PhysicalKey = PhysicalKey::new(b'a');

    fn settings() -> EngineSettings {
        EngineSettings {
            rng_seed: Some(1),
            ..EngineSettings::default()
        }
    }

    fn make_context(cursor: MockCursorProvider) -> (EngineContext, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        transport.open_now();
        let ctx = EngineContext::new(
            Box::new(Arc::clone(&transport)),
            Box::new(Arc::new(MockToggle::new())),
            Box::new(cursor),
            Arc::new(EchoLedger::default()),
            settings(),
        );
        (ctx, transport)
    }

    fn make_run(actions: Vec<Action>, now: Instant) -> SequenceRun {
        SequenceRun::new(
            Owner::sequential(),
            actions,
            RunRequest::named("test"),
            now,
            Duration::from_millis(5000),
        )
    }

    #[test]
    fn test_press_step_writes_frame_and_records_echo() {
        // Arrange
        let (mut ctx, transport) = make_context(MockCursorProvider::new());
        let now = Instant::now();
        let mut run = make_run(vec![Action::press("a")], now);

        // Act
        let outcome = ctx.process_step(&mut run, now);

        // Assert
        assert_eq!(outcome, Ok(StepOutcome::Next(Duration::from_millis(1))));
        assert_eq!(transport.frames(), vec![Frame::Press(A)]);
        assert!(ctx.ledger().is_echo(A, now));
        assert!(ctx.registry().holds(&Owner::sequential(), A));
    }

    #[test]
    fn test_unknown_key_is_skipped_without_error() {
        let (mut ctx, transport) = make_context(MockCursorProvider::new());
        let now = Instant::now();
        let mut run = make_run(vec![Action::press("no-such-key"), Action::press("a")], now);

        assert!(ctx.process_step(&mut run, now).is_ok());
        assert!(ctx.process_step(&mut run, now).is_ok());

        assert_eq!(transport.frames(), vec![Frame::Press(A)]);
        assert_eq!(run.index(), 2);
    }

    #[test]
    fn test_inverted_delay_range_is_fatal() {
        let (mut ctx, _) = make_context(MockCursorProvider::new());
        let now = Instant::now();
        let mut run = make_run(vec![Action::delay(80, 40)], now);

        let outcome = ctx.process_step(&mut run, now);

        assert_eq!(
            outcome,
            Err(StepError::InvalidDelay(DelayRangeError {
                min_ms: 80,
                max_ms: 40
            }))
        );
    }

    #[test]
    fn test_mouse_move_without_guard_is_fatal() {
        let (mut ctx, transport) = make_context(MockCursorProvider::new());
        let now = Instant::now();
        let mut run = make_run(
            vec![Action::MouseMoveAbs {
                x: 10,
                y: 10,
                duration_ms: 100,
                mode: MoveMode::Relative,
            }],
            now,
        );

        assert_eq!(ctx.process_step(&mut run, now), Err(StepError::GuardNotHeld));
        assert!(transport.frames().is_empty());
    }

    #[test]
    fn test_absolute_move_uses_cursor_delta_and_reports_movement() {
        // Arrange
        let mut cursor = MockCursorProvider::new();
        cursor.expect_position().return_const(Some((100, 200)));
        cursor
            .expect_moved_by()
            .withf(|dx, dy| *dx == 860 && *dy == 340)
            .times(1)
            .return_const(());
        let (mut ctx, transport) = make_context(cursor);
        let now = Instant::now();
        let mut run = make_run(
            vec![Action::MouseMoveAbs {
                x: 960,
                y: 540,
                duration_ms: 120,
                mode: MoveMode::Absolute,
            }],
            now,
        );
        assert!(ctx.begin(&mut run));

        // Act
        let outcome = ctx.process_step(&mut run, now);

        // Assert
        assert_eq!(outcome, Ok(StepOutcome::Next(Duration::from_millis(120))));
        assert_eq!(
            transport.frames(),
            vec![Frame::MouseMoveRel {
                dx: 860,
                dy: 340,
                duration_ms: 120
            }]
        );
    }

    #[test]
    fn test_absolute_move_with_unknown_cursor_is_skipped() {
        let mut cursor = MockCursorProvider::new();
        cursor.expect_position().return_const(None);
        cursor.expect_moved_by().times(0);
        let (mut ctx, transport) = make_context(cursor);
        let now = Instant::now();
        let mut run = make_run(
            vec![Action::MouseMoveAbs {
                x: 1,
                y: 1,
                duration_ms: 100,
                mode: MoveMode::Absolute,
            }],
            now,
        );
        assert!(ctx.begin(&mut run));

        assert!(ctx.process_step(&mut run, now).is_ok());
        assert!(transport.frames().is_empty());
    }

    #[test]
    fn test_write_failure_reconnects_and_drops_frame() {
        // Arrange
        let (mut ctx, transport) = make_context(MockCursorProvider::new());
        transport.fail_next_writes(1);
        let opens_before = transport.open_count();

        // Act
        let written = ctx.write_frame(Frame::Press(A), Instant::now());

        // Assert
        assert!(!written);
        assert!(transport.frames().is_empty());
        assert_eq!(transport.open_count(), opens_before + 1);
        assert!(!ctx.ledger().is_echo(A, Instant::now()));
    }

    #[test]
    fn test_reentrant_drive_is_ignored() {
        let (mut ctx, transport) = make_context(MockCursorProvider::new());
        let now = Instant::now();
        let mut run = make_run(vec![Action::press("a")], now);
        run.processing = true;

        let status = ctx.drive(&mut run, now);

        assert_eq!(status, RunStatus::Active);
        assert!(transport.frames().is_empty());
        assert_eq!(run.index(), 0);
    }

    #[test]
    fn test_finish_releases_keys_and_queues_completion() {
        let (mut ctx, transport) = make_context(MockCursorProvider::new());
        let now = Instant::now();
        let mut run = make_run(vec![Action::press("a")], now);
        ctx.process_step(&mut run, now).unwrap();

        ctx.finish(run, true, true, now);

        assert_eq!(transport.frames(), vec![Frame::Press(A), Frame::Release(A)]);
        assert!(ctx.registry().is_empty());
        let completions = ctx.take_completions();
        assert_eq!(completions.len(), 1);
        assert!(completions[0].success);
    }
}
