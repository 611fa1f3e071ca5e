//! Error types for afspack
//!
//! Provides a unified error type for all archive and name list operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using AfsError
pub type Result<T> = std::result::Result<T, AfsError>;

/// Unified error type for afspack operations
#[derive(Debug, Error)]
pub enum AfsError {
    // -------------------------------------------------------------------------
    // Handle Errors
    // -------------------------------------------------------------------------
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Invalid path: {}", .0.display())]
    InvalidPath(PathBuf),

    // -------------------------------------------------------------------------
    // Argument Errors
    // -------------------------------------------------------------------------
    #[error("Entry {id} out of range (entry count {count})")]
    EntryOutOfRange { id: usize, count: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error on {}: {source}", path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Malformed archive: {0}")]
    Format(String),

    /// Non-fatal: reported alongside a successful name list import.
    #[error("Entry count mismatch: archive has {container}, name list has {name_list}")]
    CountMismatch { container: usize, name_list: usize },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AfsError {
    /// Wrap an I/O error with the path it happened on
    pub(crate) fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AfsError::IoAt {
            path: path.into(),
            source,
        }
    }
}
