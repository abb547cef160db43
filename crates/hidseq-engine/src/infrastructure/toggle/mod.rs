//! Pointer-precision toggle implementations.
//!
//! The engine switches the OS "enhance pointer precision" setting off while a
//! sequence moves the mouse.  How that is done is platform specific, so the
//! production toggle just runs a user-configured program with `off` or
//! `restore` appended to its arguments.  Any non-zero exit status counts as a
//! failure.

pub mod mock;

use std::process::{Command, Stdio};

use hidseq_core::{ResourceToggle, ToggleError, ToggleState};
use tracing::debug;

/// Runs an external program to flip the setting.
#[derive(Debug, Clone)]
pub struct ScriptToggle {
    program: String,
    args: Vec<String>,
}

impl ScriptToggle {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl ResourceToggle for ScriptToggle {
    fn toggle(&self, state: ToggleState) -> Result<(), ToggleError> {
        debug!(program = %self.program, state = state.as_arg(), "running pointer toggle");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(state.as_arg())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map_err(|e| ToggleError::Spawn(format!("{}: {e}", self.program)))?;
        if status.success() {
            Ok(())
        } else {
            Err(ToggleError::ExitStatus(status.code()))
        }
    }
}

/// Toggle used when no program is configured: always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopToggle;

impl ResourceToggle for NoopToggle {
    fn toggle(&self, state: ToggleState) -> Result<(), ToggleError> {
        debug!(state = state.as_arg(), "no pointer toggle configured");
        Ok(())
    }
}
