//! Index and query errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::content::ContentError;

/// Result type for index operations.
pub type SearchResult<T> = Result<T, SearchError>;

/// Result type for query parsing.
pub type QueryResult<T> = Result<T, QueryError>;

/// Malformed query strings. Positions are character offsets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("empty query")]
    Empty,

    #[error("unexpected '{found}' at {position}")]
    UnexpectedToken { position: usize, found: String },

    #[error("unexpected end of query, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("unterminated quote starting at {position}")]
    UnterminatedQuote { position: usize },

    #[error("dangling escape at end of query")]
    DanglingEscape,

    #[error("clause '{clause}' at {position} is not of the form field:value")]
    MissingField { position: usize, clause: String },

    #[error("clause '{clause}' at {position} has an empty value")]
    MissingValue { position: usize, clause: String },
}

/// Errors of the indexer and searcher.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("malformed query: {0}")]
    Query(#[from] QueryError),

    #[error("content error: {0}")]
    Content(#[from] ContentError),

    #[error("corrupted index at {path}: {source}")]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// failure reported by an [`Indexer`](crate::search::Indexer) backend other than the file index
    #[error("index writer failed: {0}")]
    Writer(String),
}

impl From<tempfile::PersistError> for SearchError {
    fn from(e: tempfile::PersistError) -> Self {
        SearchError::Io(e.error)
    }
}

impl SearchError {
    /// check if the query string itself was at fault
    pub fn is_query_error(&self) -> bool {
        matches!(self, SearchError::Query(_))
    }
}
