//! Error types for historian-daemon operations.

use std::path::PathBuf;

/// All errors that can occur in the daemon.
#[derive(Debug, thiserror::Error)]
pub enum HistorianError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    Config { path: PathBuf, details: String },

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to persist session to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid player identity: {0}")]
    InvalidPlayer(String),

    // ─────────────────────────────────────────────────────────────────────
    // IPC Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Command registered twice: {0}")]
    DuplicateCommand(String),

    // ─────────────────────────────────────────────────────────────────────
    // Telemetry Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Telemetry link error: {0}")]
    Telemetry(String),
}

impl HistorianError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        HistorianError::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HistorianError>;
