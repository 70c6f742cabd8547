//! Index writers.

use std::path::Path;

use tracing::{debug, trace, warn};

use crate::content::{ContentError, GenericContent};
use crate::search::error::SearchResult;
use crate::search::store::{IndexStore, IndexWriter};

/// Maintains the index derived from committed content.
///
/// Adding a content whose uuid is already indexed replaces the old document,
/// so the index never holds two documents for one uuid. Nothing is visible
/// to searchers before [`Indexer::commit`].
pub trait Indexer: Send {
    /// index one content, replacing an older document of the same uuid
    fn add_document(&mut self, content: &GenericContent) -> SearchResult<()>;

    /// index many contents with a single optimization pass at the end
    fn add_documents(&mut self, contents: &[GenericContent]) -> SearchResult<()>;

    /// drop the document of a content; unknown uuids are ignored
    fn remove_document(&mut self, content: &GenericContent) -> SearchResult<()>;

    /// record the data revision the pending state mirrors
    fn mark_revision(&mut self, revision: &str);

    /// low-level access to the underlying writer
    fn writer(&mut self) -> &mut IndexWriter;

    /// persist all pending changes and close the writer
    fn commit(self: Box<Self>) -> SearchResult<()>;

    /// close the writer, discarding pending changes
    fn cleanup(self: Box<Self>);
}

/// [`Indexer`] writing the JSON index file of a directory.
#[derive(Debug)]
pub struct FileIndexer {
    writer: IndexWriter,
}

impl FileIndexer {
    pub fn open(index_dir: &Path) -> SearchResult<Self> {
        let writer = IndexWriter::open(IndexStore::new(index_dir))?;
        trace!(dir = %index_dir.display(), documents = writer.snapshot().len(), "opened indexer");
        Ok(Self { writer })
    }
}

impl Indexer for FileIndexer {
    fn add_document(&mut self, content: &GenericContent) -> SearchResult<()> {
        self.writer.upsert(content)?;
        self.writer.optimize();
        Ok(())
    }

    fn add_documents(&mut self, contents: &[GenericContent]) -> SearchResult<()> {
        for content in contents {
            self.writer.upsert(content)?;
        }
        self.writer.optimize();
        debug!(count = contents.len(), "indexed documents");
        Ok(())
    }

    fn remove_document(&mut self, content: &GenericContent) -> SearchResult<()> {
        let uuid = content.uuid().ok_or(ContentError::MissingUuid)?;
        if !self.writer.delete(&uuid) {
            trace!(%uuid, "document not indexed, nothing to remove");
        }
        Ok(())
    }

    fn mark_revision(&mut self, revision: &str) {
        self.writer.set_data_revision(revision);
    }

    fn writer(&mut self) -> &mut IndexWriter {
        &mut self.writer
    }

    fn commit(mut self: Box<Self>) -> SearchResult<()> {
        self.writer.flush()?;
        debug!(
            generation = self.writer.snapshot().generation,
            documents = self.writer.snapshot().len(),
            "committed index"
        );
        Ok(())
    }

    fn cleanup(self: Box<Self>) {
        if self.writer.is_dirty() {
            warn!("discarding uncommitted index changes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn content(name: &str) -> GenericContent {
        let mut content = GenericContent::new("/data", &["name"], &[name]);
        content.ensure_uuid();
        content
    }

    #[test]
    fn test_commit_makes_changes_durable() {
        let dir = TempDir::new().unwrap();
        let mut indexer: Box<dyn Indexer> = Box::new(FileIndexer::open(dir.path()).unwrap());

        indexer.add_documents(&[content("a"), content("b")]).unwrap();
        indexer.mark_revision("rev1");
        indexer.commit().unwrap();

        let snapshot = IndexStore::new(dir.path()).load().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.data_revision.as_deref(), Some("rev1"));
    }

    #[test]
    fn test_cleanup_discards_changes() {
        let dir = TempDir::new().unwrap();
        let mut indexer: Box<dyn Indexer> = Box::new(FileIndexer::open(dir.path()).unwrap());

        indexer.add_document(&content("a")).unwrap();
        indexer.cleanup();

        assert!(IndexStore::new(dir.path()).load().unwrap().is_empty());
    }

    #[test]
    fn test_remove_document() {
        let dir = TempDir::new().unwrap();
        let a = content("a");

        let mut indexer: Box<dyn Indexer> = Box::new(FileIndexer::open(dir.path()).unwrap());
        indexer.add_document(&a).unwrap();
        indexer.commit().unwrap();

        let mut indexer: Box<dyn Indexer> = Box::new(FileIndexer::open(dir.path()).unwrap());
        indexer.remove_document(&a).unwrap();
        let mut unknown = content("x");
        unknown.set_uuid(Uuid::new_v4());
        indexer.remove_document(&unknown).unwrap();
        indexer.commit().unwrap();

        assert!(IndexStore::new(dir.path()).load().unwrap().is_empty());
    }

    #[test]
    fn test_remove_without_uuid_fails() {
        let dir = TempDir::new().unwrap();
        let mut indexer = FileIndexer::open(dir.path()).unwrap();
        let content = GenericContent::new("/data", &["name"], &["a"]);
        assert!(indexer.remove_document(&content).is_err());
    }

    #[test]
    fn test_writer_escape_hatch() {
        let dir = TempDir::new().unwrap();
        let mut indexer = FileIndexer::open(dir.path()).unwrap();
        indexer.add_document(&content("a")).unwrap();

        indexer.writer().clear();
        assert!(indexer.writer().snapshot().is_empty());
    }
}
