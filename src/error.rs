//! Error types for the orchestrator
//!
//! Deliberately small: an unresolvable device or interface is a valid steady
//! state, not an error, and worker unavailability only drops the command with
//! a log line. What remains fatal or propagatable is persistence setup,
//! worker spawning, and malformed client payloads.

use thiserror::Error;

/// Startup error: everything that can go wrong in [`crate::orchestrator::bootstrap`].
/// Runtime failures never reach this type; stores log their write errors and
/// worker commands are dropped with a log line.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create config directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("No config directory available for this platform")]
    NoConfigDir,
}

/// Worker process errors
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn {worker} worker: {source}")]
    Spawn {
        worker: &'static str,
        source: std::io::Error,
    },

    #[error("{worker} worker has no stdio pipes")]
    MissingPipes { worker: &'static str },
}

/// Client message errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Unknown document key: {0}")]
    UnknownKey(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
