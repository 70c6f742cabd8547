//! Construction of indexers and searchers.

use std::path::Path;

use crate::search::error::SearchResult;
use crate::search::indexer::{FileIndexer, Indexer};
use crate::search::searcher::{FileSearcher, Searcher};

/// Opens indexers and searchers over an index directory.
///
/// The handler is wired with one factory and asks it for a fresh indexer per
/// index update and a fresh searcher per query.
pub trait IndexFactory: Send + Sync {
    fn create_indexer(&self, index_dir: &Path) -> SearchResult<Box<dyn Indexer>>;

    /// searcher whose results are rebuilt below `content_base`
    fn create_searcher(&self, index_dir: &Path, content_base: &Path) -> SearchResult<Box<dyn Searcher>>;
}

/// Factory for the JSON file index.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileIndexFactory;

impl IndexFactory for FileIndexFactory {
    fn create_indexer(&self, index_dir: &Path) -> SearchResult<Box<dyn Indexer>> {
        Ok(Box::new(FileIndexer::open(index_dir)?))
    }

    fn create_searcher(&self, index_dir: &Path, content_base: &Path) -> SearchResult<Box<dyn Searcher>> {
        Ok(Box::new(FileSearcher::open(index_dir, content_base)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::GenericContent;
    use tempfile::TempDir;

    #[test]
    fn test_indexer_commit_visible_to_new_searcher() {
        let dir = TempDir::new().unwrap();
        let factory = FileIndexFactory;

        let mut content = GenericContent::new(dir.path(), &["name"], &["a"]);
        content.ensure_uuid();

        let mut indexer = factory.create_indexer(dir.path()).unwrap();
        indexer.add_document(&content).unwrap();

        let before = factory.create_searcher(dir.path(), dir.path()).unwrap();
        assert!(before.is_empty());

        indexer.commit().unwrap();
        let after = factory.create_searcher(dir.path(), dir.path()).unwrap();
        assert_eq!(after.search("name:a").unwrap(), vec![content]);
    }
}
