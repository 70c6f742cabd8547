//! Content error types.

use std::path::PathBuf;

use thiserror::Error;

/// errors raised while building, storing or reading generic content
#[derive(Debug, Error)]
pub enum ContentError {
    /// content has no UUID yet, so it has no location
    #[error("content has no uuid assigned")]
    MissingUuid,

    /// a path segment cannot be used as a directory name
    #[error("invalid path segment '{segment}': {reason}")]
    InvalidSegment { segment: String, reason: &'static str },

    /// the file name and the serialized uuid disagree
    #[error("corrupted content at {path}: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// result type alias for content operations
pub type ContentResult<T> = Result<T, ContentError>;
