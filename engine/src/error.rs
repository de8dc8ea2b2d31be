//! Error types for the transfer engine.
//!
//! The primary error type is `EngineError`. Transient network and status failures
//! never reach it directly: the retrying executor absorbs them until its attempt
//! budget runs out and only then reports `RemoteConnection`. Everything else
//! (logical conflicts, integrity failures, ambiguous remote state) is raised as soon
//! as it is detected.

use std::io;
use std::path::PathBuf;

/// Errors raised by the transfer engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A path segment or file has no matching remote node
    #[error("Item does not exist: {path}")]
    ItemNotFound { path: String },

    /// A path segment exists but is a file where a folder is expected (or vice versa)
    #[error("Wrong item type at {path}: expected a {expected}")]
    WrongType { path: String, expected: &'static str },

    /// More than one remote node shares a name that must be unique
    #[error("Multiple items named \"{name}\" exist ({count} matches)")]
    AmbiguousName { name: String, count: usize },

    /// Write target exists and overwriting was not requested
    #[error("Item already exists: {path}")]
    AlreadyExists { path: String },

    /// Retries against a transient network or server condition were exhausted
    #[error("{action} failed after {attempts} attempts (last status: {}): {body}", .status.map_or_else(|| "none".to_string(), |s| s.to_string()))]
    RemoteConnection {
        action: String,
        attempts: u32,
        status: Option<u16>,
        body: String,
    },

    /// Locally computed hash disagrees with the provider's reported hash
    #[error("Integrity check failed for {name} after {attempts} attempts (local {local}, remote {})", .remote.as_deref().unwrap_or("missing"))]
    IntegrityMismatch {
        name: String,
        attempts: u32,
        local: String,
        remote: Option<String>,
    },

    /// Local filesystem failure or conflict
    #[error("Local I/O error at {}: {source}", .path.display())]
    LocalIo { path: PathBuf, source: io::Error },

    /// Path is malformed (empty segment, missing file name)
    #[error("Invalid path: {path} ({reason})")]
    InvalidPath { path: String, reason: String },

    /// No usable access token could be obtained
    #[error("Authorization failed: {0}")]
    Auth(String),

    /// The provider answered with something the adapter cannot interpret
    #[error("Unexpected provider response: {0}")]
    Protocol(String),

    /// Configuration is missing or out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// The operation was cancelled through its cancel token
    #[error("Operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<u32> {
        match self {
            Self::LocalIo { source, .. } => source.raw_os_error().map(|e| e as u32),
            _ => None,
        }
    }

    /// Shorthand for wrapping an I/O error with the path it happened on.
    pub fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Protocol(err.to_string())
    }
}
