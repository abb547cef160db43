//! Async driver for the [`Engine`].
//!
//! One tokio task owns the engine.  It waits for either a request from an
//! [`EngineHandle`] or the earliest step/watchdog deadline, whichever comes
//! first, then ticks the engine and forwards any completion events.  All
//! engine state is touched from this task only, so no lock is needed around
//! the registry, the guard or the transport.

use std::time::Instant;

use hidseq_core::Action;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use super::engine::Engine;
use super::run::{RunRequest, SequenceCompleted};

/// Capacity of the request and completion channels.
const CHANNEL_CAPACITY: usize = 128;

/// Error returned by [`EngineHandle`] once the engine task has stopped.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("engine task is no longer running")]
pub struct ServiceClosed;

/// Requests accepted by the engine task.
#[derive(Debug)]
pub enum EngineRequest {
    Run {
        actions: Vec<Action>,
        request: RunRequest,
        parallel: bool,
    },
    Stop {
        command: String,
        forced: bool,
    },
    ReleaseAll,
    Shutdown,
}

/// Cloneable handle used to talk to the engine task.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Submits `actions` under `command`.
    pub async fn execute(
        &self,
        command: &str,
        actions: Vec<Action>,
        reason: Option<String>,
        parallel: bool,
    ) -> Result<(), ServiceClosed> {
        let request = RunRequest {
            command: Some(command.to_string()),
            reason,
            ..RunRequest::default()
        };
        self.submit(actions, request, parallel).await
    }

    /// Submits `actions` with full request metadata.
    pub async fn submit(
        &self,
        actions: Vec<Action>,
        request: RunRequest,
        parallel: bool,
    ) -> Result<(), ServiceClosed> {
        self.send(EngineRequest::Run {
            actions,
            request,
            parallel,
        })
        .await
    }

    pub async fn stop(&self, command: &str, forced: bool) -> Result<(), ServiceClosed> {
        self.send(EngineRequest::Stop {
            command: command.to_string(),
            forced,
        })
        .await
    }

    /// Fires the panic path.
    pub async fn release_all(&self) -> Result<(), ServiceClosed> {
        self.send(EngineRequest::ReleaseAll).await
    }

    /// Asks the engine task to release everything and exit.
    pub async fn shutdown(&self) -> Result<(), ServiceClosed> {
        self.send(EngineRequest::Shutdown).await
    }

    async fn send(&self, request: EngineRequest) -> Result<(), ServiceClosed> {
        self.tx.send(request).await.map_err(|_| ServiceClosed)
    }
}

/// Spawns the engine task.
///
/// Returns the request handle, the stream of completion events and the task
/// handle, which yields the engine back after shutdown.  The task also shuts
/// the engine down when every handle has been dropped.
pub fn spawn(
    engine: Engine,
) -> (
    EngineHandle,
    mpsc::Receiver<SequenceCompleted>,
    JoinHandle<Engine>,
) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (done_tx, done_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(run_loop(engine, rx, done_tx));
    (EngineHandle { tx }, done_rx, task)
}

async fn run_loop(
    mut engine: Engine,
    mut requests: mpsc::Receiver<EngineRequest>,
    completions: mpsc::Sender<SequenceCompleted>,
) -> Engine {
    info!("engine task started");
    loop {
        let deadline = engine.next_deadline();
        tokio::select! {
            request = requests.recv() => {
                let now = Instant::now();
                match request {
                    Some(EngineRequest::Run { actions, request, parallel }) => {
                        engine.submit(actions, request, parallel, now);
                    }
                    Some(EngineRequest::Stop { command, forced }) => {
                        if !engine.stop(&command, forced, now) {
                            debug!(command, "stop requested for a command that is not running");
                        }
                    }
                    Some(EngineRequest::ReleaseAll) => engine.release_all_keys(now),
                    Some(EngineRequest::Shutdown) | None => {
                        engine.shutdown(now);
                        forward(&mut engine, &completions);
                        break;
                    }
                }
            }
            _ = sleep_until(deadline) => {}
        }

        engine.tick(Instant::now());
        forward(&mut engine, &completions);
    }
    info!("engine task stopped");
    engine
}

/// Hands completion events to the receiver without ever waiting on it.
///
/// The engine task must keep ticking and serving release-all requests even
/// when nobody drains the completion stream, so a full channel drops events.
fn forward(engine: &mut Engine, completions: &mpsc::Sender<SequenceCompleted>) {
    for completion in engine.take_completions() {
        match completions.try_send(completion) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!(
                    command = dropped.command.as_deref(),
                    success = dropped.success,
                    "completion channel full, event dropped"
                );
            }
            // A dropped receiver only means nobody is listening any more.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}
