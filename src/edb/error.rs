//! Handler errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::content::ContentError;
use crate::search::SearchError;
use crate::storage::StorageError;

/// Result type for handler operations.
pub type EdbResult<T> = Result<T, EdbError>;

/// Every failure of the handler surface. The original cause stays reachable
/// through [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum EdbError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("index error: {0}")]
    Search(#[from] SearchError),

    #[error("content error: {0}")]
    Content(#[from] ContentError),

    /// a reset was asked for with a head that is no longer current
    #[error("stale head: expected {expected}, repository is at {actual}")]
    StaleHead { expected: String, actual: String },

    /// revision `revision` was committed but the index could not follow
    #[error("revision {revision} is committed but the index is out of sync: {source}")]
    IndexOutOfSync {
        revision: String,
        #[source]
        source: Box<EdbError>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read configuration {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EdbError {
    /// check if repeating the operation can succeed
    ///
    /// stale heads succeed once the caller re-reads the head, an out of sync
    /// index is repaired by the next commit
    pub fn is_retriable(&self) -> bool {
        match self {
            EdbError::StaleHead { .. } | EdbError::IndexOutOfSync { .. } => true,
            EdbError::Storage(e) => e.is_retriable(),
            _ => false,
        }
    }

    /// check if the query string was malformed
    pub fn is_query_error(&self) -> bool {
        matches!(self, EdbError::Search(e) if e.is_query_error())
    }
}
