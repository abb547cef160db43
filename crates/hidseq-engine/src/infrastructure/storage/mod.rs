//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML file from the platform config
//! directory (or an explicit path), writes it back, and falls back to
//! defaults on first run.

pub mod config;
