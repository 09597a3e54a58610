// src/errors.rs

//! Crate-wide error aliases and helpers.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutopilotError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error("another autopilot instance is already running (pid {pid}, since {since})")]
    AlreadyRunning { pid: u32, since: DateTime<Utc> },

    #[error("invalid daemon state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AutopilotError>;
