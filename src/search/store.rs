//! On-disk index.
//!
//! The whole index is one JSON file (`documents.json`) inside the index
//! directory. Writers load it, mutate it in memory and replace it atomically
//! on commit; readers load it once and keep that snapshot until refreshed.
//!
//! Besides the documents the file carries postings (field -> term -> uuids)
//! for exact-value lookups. Postings are rebuilt in one pass by
//! [`IndexWriter::optimize`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::content::{GenericContent, ContentError, UUID_KEY};
use crate::search::error::{SearchError, SearchResult};

/// file name of the index inside the index directory
pub const INDEX_FILE: &str = "documents.json";

/// One indexed content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// insertion sequence, used to break ranking ties
    pub seq: u64,
    pub segments: Vec<String>,
    /// the content properties plus `uuid`
    pub fields: BTreeMap<String, String>,
}

impl IndexedDocument {
    fn from_content(content: &GenericContent, uuid: Uuid, seq: u64) -> Self {
        let mut fields = content.properties().clone();
        fields.insert(UUID_KEY.to_string(), uuid.to_string());

        Self {
            seq,
            segments: content.segments().to_vec(),
            fields,
        }
    }

    /// rebuild the content below `base`
    pub fn to_content(&self, uuid: Uuid, base: &Path) -> GenericContent {
        let mut content = GenericContent::detached();
        content.set_repository_base(base);
        content.set_uuid(uuid);
        content.set_segments(self.segments.clone());
        for (key, value) in &self.fields {
            if key != UUID_KEY {
                content.set_property(key.as_str(), value);
            }
        }
        content
    }
}

pub(crate) type Postings = BTreeMap<String, BTreeMap<String, BTreeSet<Uuid>>>;

/// A complete index state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// bumped on every commit
    pub generation: u64,
    /// the data revision this index mirrors
    pub data_revision: Option<String>,
    next_seq: u64,
    documents: BTreeMap<Uuid, IndexedDocument>,
    #[serde(default)]
    postings: Postings,
}

impl IndexSnapshot {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&IndexedDocument> {
        self.documents.get(uuid)
    }

    pub fn documents(&self) -> impl Iterator<Item = (&Uuid, &IndexedDocument)> {
        self.documents.iter()
    }

    /// documents whose `field` is exactly `term`
    pub fn lookup(&self, field: &str, term: &str) -> Option<&BTreeSet<Uuid>> {
        self.postings.get(field).and_then(|terms| terms.get(term))
    }
}

/// Reads and writes the index file of one directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// load the snapshot; a missing file is an empty index
    pub fn load(&self) -> SearchResult<IndexSnapshot> {
        let file = self.file();
        let bytes = match fs::read(&file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(IndexSnapshot::default()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes).map_err(|source| SearchError::Corrupted { path: file, source })
    }

    /// replace the index file atomically
    pub fn save(&self, snapshot: &IndexSnapshot) -> SearchResult<()> {
        fs::create_dir_all(&self.dir)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, snapshot)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.file())?;

        trace!(generation = snapshot.generation, "saved index");
        Ok(())
    }
}

/// Low-level write access to an index.
///
/// Mutations stay in memory until [`IndexWriter::flush`].
#[derive(Debug)]
pub struct IndexWriter {
    store: IndexStore,
    snapshot: IndexSnapshot,
    postings_stale: bool,
    dirty: bool,
}

impl IndexWriter {
    pub fn open(store: IndexStore) -> SearchResult<Self> {
        let snapshot = store.load()?;
        Ok(Self {
            store,
            snapshot,
            postings_stale: false,
            dirty: false,
        })
    }

    pub fn snapshot(&self) -> &IndexSnapshot {
        &self.snapshot
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// insert or replace the document of a content
    ///
    /// the previous document of the same uuid is removed first, the new one
    /// gets a fresh sequence number
    pub fn upsert(&mut self, content: &GenericContent) -> SearchResult<()> {
        let uuid = content.uuid().ok_or(ContentError::MissingUuid)?;
        self.delete(&uuid);

        let seq = self.snapshot.next_seq;
        self.snapshot.next_seq += 1;
        self.snapshot
            .documents
            .insert(uuid, IndexedDocument::from_content(content, uuid, seq));
        self.postings_stale = true;
        self.dirty = true;
        Ok(())
    }

    /// remove a document; returns whether one existed
    pub fn delete(&mut self, uuid: &Uuid) -> bool {
        let existed = self.snapshot.documents.remove(uuid).is_some();
        if existed {
            self.postings_stale = true;
            self.dirty = true;
        }
        existed
    }

    /// drop every document
    pub fn clear(&mut self) {
        self.snapshot.documents.clear();
        self.snapshot.postings.clear();
        self.postings_stale = false;
        self.dirty = true;
    }

    pub fn set_data_revision(&mut self, revision: impl Into<String>) {
        self.snapshot.data_revision = Some(revision.into());
        self.dirty = true;
    }

    /// rebuild the postings from the documents
    pub fn optimize(&mut self) {
        let mut postings = Postings::new();
        for (uuid, doc) in &self.snapshot.documents {
            for (field, value) in &doc.fields {
                postings
                    .entry(field.clone())
                    .or_default()
                    .entry(value.clone())
                    .or_default()
                    .insert(*uuid);
            }
        }

        self.snapshot.postings = postings;
        self.postings_stale = false;
        debug!(documents = self.snapshot.len(), "optimized index");
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// persist pending changes as a new generation
    pub fn flush(&mut self) -> SearchResult<()> {
        if !self.dirty {
            return Ok(());
        }
        if self.postings_stale {
            self.optimize();
        }

        self.snapshot.generation += 1;
        self.store.save(&self.snapshot)?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn content(name: &str) -> GenericContent {
        let mut content = GenericContent::new("/data", &["name"], &[name]);
        content.ensure_uuid();
        content
    }

    #[test]
    fn test_missing_file_is_empty_index() {
        let dir = TempDir::new().unwrap();
        let snapshot = IndexStore::new(dir.path()).load().unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.generation, 0);
        assert_eq!(snapshot.data_revision, None);
    }

    #[test]
    fn test_upsert_replaces_document() {
        let dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::open(IndexStore::new(dir.path())).unwrap();

        let mut c = content("a");
        writer.upsert(&c).unwrap();
        c.set_property("name", "b");
        writer.upsert(&c).unwrap();
        writer.optimize();

        let snapshot = writer.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.lookup("name", "a").is_none());
        let uuid = c.uuid().unwrap();
        assert!(snapshot.lookup("name", "b").unwrap().contains(&uuid));
        assert_eq!(snapshot.get(&uuid).unwrap().seq, 1);
    }

    #[test]
    fn test_flush_persists_and_bumps_generation() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path());
        let mut writer = IndexWriter::open(store.clone()).unwrap();

        let c = content("a");
        writer.upsert(&c).unwrap();
        writer.set_data_revision("abc");
        writer.flush().unwrap();
        assert!(!writer.is_dirty());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.generation, 1);
        assert_eq!(loaded.data_revision.as_deref(), Some("abc"));
        assert!(loaded.lookup("name", "a").is_some());

        let doc = loaded.get(&c.uuid().unwrap()).unwrap();
        assert_eq!(doc.to_content(c.uuid().unwrap(), Path::new("/data")), c);

        // nothing changed, nothing written
        writer.flush().unwrap();
        assert_eq!(store.load().unwrap().generation, 1);
    }

    #[test]
    fn test_corrupted_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), b"{ not json").unwrap();

        let result = IndexStore::new(dir.path()).load();
        assert!(matches!(result, Err(SearchError::Corrupted { .. })));
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::open(IndexStore::new(dir.path())).unwrap();
        assert!(!writer.delete(&Uuid::new_v4()));
        assert!(!writer.is_dirty());
    }
}
