//! Storage layer error types
//!
//! All errors that can occur while talking to the version-controlled store
//! are defined here. We use `thiserror` for ergonomic error definition.

use std::path::PathBuf;

use thiserror::Error;

use crate::content::ContentError;
use crate::storage::types::RevisionId;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// content could not be located or read
    #[error("content error: {0}")]
    Content(#[from] ContentError),

    /// the requested revision or reference does not resolve
    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    /// a reset asked for more steps than the history holds
    #[error("history too short: requested {requested} steps, only {available} available")]
    HistoryTooShort { requested: usize, available: usize },

    /// the head moved since the caller last looked at it
    #[error("stale head: expected {expected}, repository is at {actual}")]
    StaleHead { expected: String, actual: RevisionId },

    /// a commit was finalized without author or message
    #[error("commit is missing its {0}")]
    IncompleteCommit(&'static str),

    /// a file outside the working tree was staged
    #[error("path {path} is outside the repository at {root}")]
    OutsideRepository { path: PathBuf, root: PathBuf },

    /// the tree entry has an unexpected type
    #[error("unexpected entry type at {path}: expected {expected}, found {found}")]
    UnexpectedEntryType {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// repo is not initialized
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// repo is empty (no commits)
    #[error("repository is empty: no commits found")]
    EmptyRepository,

    /// repository has no working tree
    #[error("repository at {0} is bare")]
    BareRepository(PathBuf),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::RevisionNotFound(_)
                | StorageError::NotInitialized(_)
                | StorageError::EmptyRepository
        )
    }

    /// check if this error is a conflict with another writer
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::StaleHead { .. })
    }

    /// check if this error is recoverable by retry
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::StaleHead { .. })
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let not_found = StorageError::RevisionNotFound("HEAD~9".to_string());
        assert!(not_found.is_not_found());
        assert!(!not_found.is_conflict());

        let stale = StorageError::StaleHead {
            expected: "abc".to_string(),
            actual: RevisionId::from_hex("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap(),
        };
        assert!(!stale.is_not_found());
        assert!(stale.is_conflict());
        assert!(stale.is_retriable());
    }
}
