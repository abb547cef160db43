//! `hidseq` command-line entry point.
//!
//! Loads the command library, opens the serial link and plays one command
//! (or the panic button) through the engine.
//!
//! ```text
//! main()
//!  └─ load_config()              -- TOML, defaults when absent
//!  └─ Engine::new(...)           -- serial/mock transport, toggle, cursor
//!  └─ service::spawn(engine)     -- Tokio task owning the engine
//!       └─ wait for completion or Ctrl-C
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hidseq_core::{Action, EchoLedger, ResourceToggle};
use hidseq_engine::application::device::Transport;
use hidseq_engine::application::service;
use hidseq_engine::infrastructure::cursor::DeadReckoningCursor;
use hidseq_engine::infrastructure::storage::config::{load_config, AppConfig};
use hidseq_engine::infrastructure::toggle::{NoopToggle, ScriptToggle};
use hidseq_engine::infrastructure::transport::{MockTransport, SerialTransport};
use hidseq_engine::{Engine, RunRequest, RELEASE_ALL_COMMAND};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Plays keyboard/mouse sequences through a serial HID emulator.
#[derive(Debug, Parser)]
#[command(name = "hidseq", version)]
struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true, env = "HIDSEQ_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port, overriding `[device] port`.
    #[arg(long, global = true, env = "HIDSEQ_PORT")]
    port: Option<String>,

    /// Record frames in memory instead of opening the device.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the configured commands.
    List,
    /// Run one configured command and wait for it to finish.
    Run {
        /// Command name as configured in `[[commands]]`.
        name: String,
        /// Free-form reason recorded in logs and the completion event.
        #[arg(long)]
        reason: Option<String>,
        /// Fail instead of auto-recovering if the sequence stalls.
        #[arg(long)]
        one_shot: bool,
        /// Known cursor position `X,Y` for absolute mouse moves.
        #[arg(long, value_parser = parse_point)]
        cursor: Option<(i32, i32)>,
    },
    /// Release every key on the device.
    ReleaseAll,
}

fn parse_point(s: &str) -> Result<(i32, i32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {s:?}"))?;
    let x = x.trim().parse().map_err(|e| format!("bad X: {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad Y: {e}"))?;
    Ok((x, y))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("failed to load config")?;
    if let Some(port) = &cli.port {
        config.device.port = port.clone();
    }

    // Level from the config file, overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.engine.log_level)),
        )
        .init();

    for problem in config.lint() {
        warn!("config: {problem}");
    }

    match cli.command {
        Command::List => {
            for entry in &config.commands {
                let lane = if entry.parallel { "parallel" } else { "sequential" };
                println!("{:<24} {:<10} {} steps", entry.name, lane, entry.actions.len());
            }
            Ok(())
        }
        Command::Run {
            name,
            reason,
            one_shot,
            cursor,
        } => {
            let Some(entry) = config.command(&name).cloned() else {
                bail!("no command named {name:?} in config");
            };
            let mut request = RunRequest::named(&entry.name).with_source("cli");
            request.reason = reason;
            request.one_shot = one_shot;
            run_command(&config, cli.dry_run, cursor, entry.actions, request, entry.parallel).await
        }
        Command::ReleaseAll => {
            let request = RunRequest::named(RELEASE_ALL_COMMAND).with_source("cli");
            run_command(&config, cli.dry_run, None, Vec::new(), request, false).await
        }
    }
}

async fn run_command(
    config: &AppConfig,
    dry_run: bool,
    cursor: Option<(i32, i32)>,
    actions: Vec<Action>,
    request: RunRequest,
    parallel: bool,
) -> anyhow::Result<()> {
    let mock = Arc::new(MockTransport::new());
    let transport: Box<dyn Transport> = if dry_run {
        Box::new(Arc::clone(&mock))
    } else {
        Box::new(SerialTransport::new(config.serial_settings()))
    };
    let toggle: Box<dyn ResourceToggle> = match &config.pointer_toggle.program {
        Some(program) => Box::new(ScriptToggle::new(
            program.clone(),
            config.pointer_toggle.args.clone(),
        )),
        None => Box::new(NoopToggle),
    };
    let cursor = match cursor {
        Some((x, y)) => DeadReckoningCursor::at(x, y),
        None => DeadReckoningCursor::new(),
    };

    let mut engine = Engine::new(
        transport,
        toggle,
        Box::new(cursor),
        Arc::new(EchoLedger::new(config.echo_window())),
        config.engine_settings(),
    );
    engine
        .connect()
        .with_context(|| format!("failed to open {}", config.device.port))?;

    let (handle, mut completions, task) = service::spawn(engine);
    let panic_only = request.command.as_deref() == Some(RELEASE_ALL_COMMAND);
    handle.submit(actions, request, parallel).await?;

    let mut success = true;
    if !panic_only {
        tokio::select! {
            done = completions.recv() => {
                if let Some(done) = done {
                    info!(command = done.command.as_deref(), success = done.success, "finished");
                    success = done.success;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, releasing all keys");
                success = false;
            }
        }
    }

    handle.shutdown().await?;
    let engine = task.await.context("engine task panicked")?;
    info!(guard_refcount = engine.guard_refcount(), "engine stopped");

    if dry_run {
        for frame in mock.frames() {
            println!("{frame:?}");
        }
    }

    if success {
        Ok(())
    } else {
        bail!("sequence did not complete")
    }
}
