//! Error types for bookmark operations

use thiserror::Error;

/// Result type for bookmark operations
pub type Result<T> = std::result::Result<T, BookmarkError>;

/// Errors that can occur during bookmark operations
#[derive(Error, Debug)]
pub enum BookmarkError {
    /// A bookmark with the same id already exists for the instance
    #[error("Bookmark {bookmark_id} already exists for instance {instance_id}")]
    DuplicateId {
        instance_id: String,
        bookmark_id: String,
    },

    /// Bookmark not found
    #[error("Bookmark {bookmark_id} not found for instance {instance_id}")]
    NotFound {
        instance_id: String,
        bookmark_id: String,
    },

    /// Attempt to change a field that is fixed at creation
    #[error("Bookmark field '{field}' is immutable")]
    Immutable { field: &'static str },

    /// Store unavailable or timed out; the caller may retry
    #[error("Transient store error: {0}")]
    Transient(String),

    /// Stimulus name not present in a strict registry
    #[error("Unknown stimulus: {0}")]
    UnknownStimulus(String),

    /// Invalid bookmark or request
    #[error("Invalid bookmark: {0}")]
    Invalid(String),

    /// Another index rebuild is already running
    #[error("Index rebuild already in progress")]
    RebuildInProgress,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary serialization error
    #[error("Binary serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BookmarkError {
    pub(crate) fn not_found(instance_id: &str, bookmark_id: &str) -> Self {
        Self::NotFound {
            instance_id: instance_id.to_string(),
            bookmark_id: bookmark_id.to_string(),
        }
    }

    /// Whether the caller may retry the failed operation with backoff.
    ///
    /// Nothing inside this crate retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Io(_))
    }
}
