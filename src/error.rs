//! Error types for perception-eval operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for perception-eval operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading ground truth or driving a test suite.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The dataset description could not be read or parsed. This is fatal to
    /// the whole suite, unlike the per-case errors below.
    #[error("Dataset load failed: {path}: {reason}")]
    DatasetLoad {
        /// Path to the dataset description that failed to load.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// An image payload could not be read or its format recognized.
    #[error("Image decode failed: {path}: {reason}")]
    ImageDecode {
        /// Path to the image that failed.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// The outbound channel to the system under test rejected a transmission.
    #[error("Link error: {0}")]
    Link(String),

    /// An inbound notification arrived on a source name with no handler bound.
    #[error("No handler bound for inbound source: {0}")]
    UnboundSource(String),

    /// Error while scanning the test directory for image files.
    #[error("Scan error: {0}")]
    Scan(String),

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
