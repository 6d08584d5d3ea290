//! Error types for backend reconciliation

use std::time::Duration;

use thiserror::Error;

use crate::provider::ProviderError;

/// Errors that can occur while reconciling a remote state backend
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A known configuration key holds a value of the wrong shape
    #[error("Invalid {backend} backend configuration: {source}")]
    Decode {
        backend: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The resource identifier is missing from the configuration
    #[error("Missing required remote state configuration {0}")]
    MissingRequiredConfig(String),

    /// The provider API returned an error
    #[error("{operation} failed: {source}")]
    RemoteCall {
        operation: &'static str,
        #[source]
        source: ProviderError,
    },

    /// The resource was created but never became visible
    #[error(
        "Timed out waiting for {resource} to become visible after {attempts} attempts ({waited:?})"
    )]
    ConsistencyTimeout {
        resource: String,
        attempts: u32,
        waited: Duration,
    },

    /// The existence check failed, so the resource is assumed to exist
    #[error("Could not determine whether {resource} exists: {source}")]
    AmbiguousExistence {
        resource: String,
        #[source]
        source: ProviderError,
    },

    /// The surrounding operation was cancelled or ran past its deadline
    #[error("Cancelled while {operation}")]
    Cancelled { operation: &'static str },

    /// No provider is registered for the backend type
    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),
}

impl ReconcileError {
    /// Create a remote call error for the named operation
    pub fn remote(operation: &'static str, source: ProviderError) -> Self {
        Self::RemoteCall { operation, source }
    }

    /// Create a missing configuration error
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingRequiredConfig(field.into())
    }
}

/// Result type for reconciliation operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;
