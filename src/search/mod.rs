//! Field index over committed content.
//!
//! The index holds one document per live content uuid. Its fields mirror the
//! content properties plus `uuid`. [`Indexer`]s write it, [`Searcher`]s
//! answer queries written in the language described in [`query`].

mod error;
mod factory;
mod indexer;
pub mod query;
mod searcher;
mod store;

pub use error::{QueryError, QueryResult, SearchError, SearchResult};
pub use factory::{FileIndexFactory, IndexFactory};
pub use indexer::{FileIndexer, Indexer};
pub use query::{Pattern, Query};
pub use searcher::{FileSearcher, Searcher};
pub use store::{IndexSnapshot, IndexStore, IndexWriter, IndexedDocument, INDEX_FILE};
