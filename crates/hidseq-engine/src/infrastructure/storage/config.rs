//! TOML-based configuration for the engine and its command library.
//!
//! Reads and writes [`AppConfig`] from the platform-appropriate file:
//! - Windows:  `%APPDATA%\hidseq\config.toml`
//! - Linux:    `~/.config/hidseq/config.toml`
//! - macOS:    `~/Library/Application Support/hidseq/config.toml`
//!
//! An explicit path (`--config`) bypasses the platform lookup.
//!
//! ```toml
//! [device]
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//!
//! [engine]
//! watchdog_ms = 5000
//! max_recovery_attempts = 2
//!
//! [pointer_toggle]
//! program = "/usr/local/bin/pointer-precision"
//!
//! [[commands]]
//! name = "jump"
//! actions = [
//!     { type = "press", key = "space" },
//!     { type = "delay", min_ms = 40, max_ms = 80 },
//!     { type = "release", key = "space" },
//! ]
//! ```
//!
//! Every field has a `#[serde(default = ...)]`, so a missing file, a missing
//! section or an older file without newer keys all load cleanly.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hidseq_core::domain::echo::DEFAULT_ECHO_IGNORE_MS;
use hidseq_core::{resolve_key_name, Action};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::engine::RELEASE_ALL_COMMAND;

use crate::application::run::{
    EngineSettings, DEFAULT_MAX_RECOVERY_ATTEMPTS, DEFAULT_MIN_STEP_DELAY_MS, DEFAULT_WATCHDOG_MS,
};
use crate::infrastructure::transport::serial::SerialSettings;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub echo: EchoConfig,
    #[serde(default)]
    pub pointer_toggle: PointerToggleConfig,
    #[serde(default)]
    pub commands: Vec<CommandEntry>,
}

/// Serial link to the HID emulator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Serial port name, e.g. `COM5` or `/dev/ttyACM0`.
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read/write timeout of the port.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Executor tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    #[serde(default = "default_watchdog_ms")]
    pub watchdog_ms: u64,
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,
    #[serde(default = "default_min_step_delay_ms")]
    pub min_step_delay_ms: u64,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Echo suppression window for the passive listener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EchoConfig {
    #[serde(default = "default_echo_ignore_ms")]
    pub ignore_ms: u64,
}

/// External program that switches pointer precision off and back.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PointerToggleConfig {
    /// Program to run; `None` disables the toggle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Arguments placed before the `off` / `restore` argument.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// One named command in the library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandEntry {
    pub name: String,
    /// Run on its own parallel lane instead of the sequential lane.
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub actions: Vec<Action>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_port() -> String {
    if cfg!(target_os = "windows") {
        "COM3".to_string()
    } else {
        "/dev/ttyACM0".to_string()
    }
}
fn default_baud_rate() -> u32 {
    115_200
}
fn default_timeout_ms() -> u64 {
    100
}
fn default_watchdog_ms() -> u64 {
    DEFAULT_WATCHDOG_MS
}
fn default_max_recovery_attempts() -> u32 {
    DEFAULT_MAX_RECOVERY_ATTEMPTS
}
fn default_min_step_delay_ms() -> u64 {
    DEFAULT_MIN_STEP_DELAY_MS
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_echo_ignore_ms() -> u64 {
    DEFAULT_ECHO_IGNORE_MS
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watchdog_ms: default_watchdog_ms(),
            max_recovery_attempts: default_max_recovery_attempts(),
            min_step_delay_ms: default_min_step_delay_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            ignore_ms: default_echo_ignore_ms(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Looks up a command by name.
    pub fn command(&self, name: &str) -> Option<&CommandEntry> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            watchdog: Duration::from_millis(self.engine.watchdog_ms),
            max_recovery_attempts: self.engine.max_recovery_attempts,
            // The step floor is never zero.
            min_step_delay: Duration::from_millis(self.engine.min_step_delay_ms.max(1)),
            rng_seed: None,
        }
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            port: self.device.port.clone(),
            baud_rate: self.device.baud_rate,
            timeout: Duration::from_millis(self.device.timeout_ms),
        }
    }

    pub fn echo_window(&self) -> Duration {
        Duration::from_millis(self.echo.ignore_ms)
    }

    /// Reports problems in the command library that would surface at run
    /// time, such as unknown key names or inverted delay ranges.
    pub fn lint(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();
        for command in &self.commands {
            if command.name == RELEASE_ALL_COMMAND {
                problems.push(format!(
                    "{:?} is reserved for the release-all path and never runs its actions",
                    command.name
                ));
            }
            if !seen.insert(command.name.as_str()) {
                problems.push(format!(
                    "{}: duplicate command name, only the first entry is used",
                    command.name
                ));
            }
            for (step, action) in command.actions.iter().enumerate() {
                match action {
                    Action::Press { key, .. } | Action::Release { key, .. } => {
                        if resolve_key_name(key).is_none() {
                            problems.push(format!(
                                "{}: step {step}: unknown key {key:?}",
                                command.name
                            ));
                        }
                    }
                    Action::Delay { min_ms, max_ms } if min_ms > max_ms => {
                        problems.push(format!(
                            "{}: step {step}: delay min {min_ms} > max {max_ms}",
                            command.name
                        ));
                    }
                    _ => {}
                }
            }
        }
        problems
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from `path`, or from the platform location when `None`.
///
/// A missing file yields [`AppConfig::default()`].
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `hidseq` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("hidseq"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("hidseq"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("hidseq")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hidseq_core::{MouseButton, MoveMode};
    use uuid::Uuid;

    #[test]
    fn test_defaults_match_engine_constants() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.device.baud_rate, 115_200);
        assert_eq!(cfg.engine.watchdog_ms, 5000);
        assert_eq!(cfg.engine.max_recovery_attempts, 2);
        assert_eq!(cfg.engine.min_step_delay_ms, 1);
        assert_eq!(cfg.echo.ignore_ms, 30);
        assert_eq!(cfg.engine.log_level, "info");
        assert!(cfg.pointer_toggle.program.is_none());
        assert!(cfg.commands.is_empty());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_engine_section_overrides_defaults() {
        let toml_str = r#"
[engine]
watchdog_ms = 1500
"#;

        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        assert_eq!(cfg.engine.watchdog_ms, 1500);
        assert_eq!(cfg.engine.max_recovery_attempts, 2);
        assert_eq!(cfg.engine_settings().watchdog, Duration::from_millis(1500));
    }

    #[test]
    fn test_command_library_parses_inline_actions() {
        // Arrange
        let toml_str = r#"
[[commands]]
name = "loot"
parallel = true
actions = [
    { type = "mouse_move_abs", x = 960, y = 540 },
    { type = "mouse_click", button = "right" },
]

[[commands]]
name = "jump"
actions = [
    { type = "press", key = "space" },
    { type = "delay", min_ms = 40, max_ms = 80 },
    { type = "release", key = "space" },
]
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize commands");

        // Assert
        let loot = cfg.command("loot").expect("loot present");
        assert!(loot.parallel);
        assert_eq!(
            loot.actions,
            vec![
                Action::MouseMoveAbs {
                    x: 960,
                    y: 540,
                    duration_ms: 100,
                    mode: MoveMode::Absolute,
                },
                Action::MouseClick {
                    button: MouseButton::Right
                },
            ]
        );
        let jump = cfg.command("jump").expect("jump present");
        assert!(!jump.parallel);
        assert_eq!(jump.actions[1], Action::delay(40, 80));
        assert!(cfg.command("missing").is_none());
    }

    #[test]
    fn test_lint_reports_unknown_keys_and_inverted_delays() {
        let cfg = AppConfig {
            commands: vec![CommandEntry {
                name: "bad".to_string(),
                parallel: false,
                actions: vec![
                    Action::press("not-a-key"),
                    Action::delay(90, 10),
                    Action::press("a"),
                ],
            }],
            ..AppConfig::default()
        };

        let problems = cfg.lint();

        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("not-a-key"));
        assert!(problems[1].contains("delay min 90 > max 10"));
    }

    #[test]
    fn test_lint_flags_duplicate_and_reserved_names() {
        let entry = |name: &str| CommandEntry {
            name: name.to_string(),
            parallel: false,
            actions: vec![Action::press("a"), Action::release("a")],
        };
        let cfg = AppConfig {
            commands: vec![entry("jump"), entry("jump"), entry(RELEASE_ALL_COMMAND)],
            ..AppConfig::default()
        };

        let problems = cfg.lint();

        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("duplicate"));
        assert!(problems[1].contains("reserved"));
    }

    #[test]
    fn test_zero_step_delay_is_raised_to_one_ms() {
        let mut cfg = AppConfig::default();
        cfg.engine.min_step_delay_ms = 0;

        assert_eq!(cfg.engine_settings().min_step_delay, Duration::from_millis(1));
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let dir = std::env::temp_dir().join(format!("hidseq_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_config(Some(&path));

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let path = std::env::temp_dir()
            .join(format!("hidseq_test_{}", Uuid::new_v4()))
            .join("config.toml");

        let cfg = load_config(Some(&path)).expect("missing file is not an error");

        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_settings_and_commands() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("hidseq_test_{}", Uuid::new_v4()));
        let path = dir.join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.device.port = "COM7".to_string();
        cfg.pointer_toggle.program = Some("toggle.exe".to_string());
        cfg.commands.push(CommandEntry {
            name: "tap".to_string(),
            parallel: false,
            actions: vec![Action::press("a"), Action::delay(50, 50), Action::release("a")],
        });

        // Act
        save_config(&cfg, &path).expect("save");
        let loaded = load_config(Some(&path)).expect("load");

        // Assert
        assert_eq!(loaded, cfg);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("hidseq/config.toml") || path.ends_with("config.toml"),
                "unexpected config path {path:?}"
            );
        }
    }
}
