//! Errors reading local state metadata

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when reading local state metadata
#[derive(Debug, Error)]
pub enum StateError {
    /// The metadata file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metadata file is not valid JSON or has an unexpected shape
    #[error("Invalid state metadata in {path}: {source}")]
    InvalidMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for metadata operations
pub type StateResult<T> = Result<T, StateError>;
