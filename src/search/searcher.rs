//! Query execution.
//!
//! A searcher works on the snapshot it loaded when it was opened; it sees
//! later index commits only after [`Searcher::refresh`].
//!
//! Ranking: a document scores one point per satisfied clause (`AND` and `OR`
//! add up the points of their operands, `NOT` and match-all score nothing).
//! Results are ordered by descending score, then by insertion sequence.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use uuid::Uuid;

use crate::content::GenericContent;
use crate::search::error::SearchResult;
use crate::search::query::Query;
use crate::search::store::{IndexSnapshot, IndexStore, IndexedDocument};

/// Read-only query access to an index.
pub trait Searcher: Send {
    /// run a query and rebuild the matching contents
    fn search(&self, query: &str) -> SearchResult<Vec<GenericContent>>;

    /// the content indexed under `uuid`
    fn find(&self, uuid: &Uuid) -> Option<GenericContent>;

    /// the data revision the loaded snapshot mirrors
    fn indexed_revision(&self) -> Option<&str>;

    /// number of indexed documents
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// root directory of the index
    fn base_index(&self) -> &Path;

    /// reload the snapshot if the index was committed since; returns whether it was
    fn refresh(&mut self) -> SearchResult<bool>;

    /// release the snapshot
    fn cleanup(self: Box<Self>);
}

/// [`Searcher`] over the JSON index file of a directory.
#[derive(Debug)]
pub struct FileSearcher {
    store: IndexStore,
    content_base: PathBuf,
    snapshot: IndexSnapshot,
}

impl FileSearcher {
    /// open the index in `index_dir`; results are rebuilt below `content_base`
    pub fn open(index_dir: &Path, content_base: &Path) -> SearchResult<Self> {
        let store = IndexStore::new(index_dir);
        let snapshot = store.load()?;

        Ok(Self {
            store,
            content_base: content_base.to_path_buf(),
            snapshot,
        })
    }

    /// run a parsed query, returning (uuid, score) pairs in result order
    pub fn execute(&self, query: &Query) -> Vec<(Uuid, u32)> {
        let mut hits: Vec<(Uuid, u32, u64)> = match candidates(query, &self.snapshot) {
            Some(uuids) => uuids
                .into_iter()
                .filter_map(|uuid| {
                    let doc = self.snapshot.get(&uuid)?;
                    score(query, doc).map(|s| (uuid, s, doc.seq))
                })
                .collect(),
            None => self
                .snapshot
                .documents()
                .filter_map(|(uuid, doc)| score(query, doc).map(|s| (*uuid, s, doc.seq)))
                .collect(),
        };

        hits.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        hits.into_iter().map(|(uuid, s, _)| (uuid, s)).collect()
    }
}

impl Searcher for FileSearcher {
    fn search(&self, query: &str) -> SearchResult<Vec<GenericContent>> {
        let parsed = Query::parse(query)?;
        trace!(?parsed, "parsed query");

        let results: Vec<GenericContent> = self
            .execute(&parsed)
            .into_iter()
            .filter_map(|(uuid, _)| self.find(&uuid))
            .collect();

        debug!(query, hits = results.len(), "search finished");
        Ok(results)
    }

    fn find(&self, uuid: &Uuid) -> Option<GenericContent> {
        self.snapshot
            .get(uuid)
            .map(|doc| doc.to_content(*uuid, &self.content_base))
    }

    fn indexed_revision(&self) -> Option<&str> {
        self.snapshot.data_revision.as_deref()
    }

    fn len(&self) -> usize {
        self.snapshot.len()
    }

    fn base_index(&self) -> &Path {
        self.store.dir()
    }

    fn refresh(&mut self) -> SearchResult<bool> {
        let latest = self.store.load()?;
        if latest.generation == self.snapshot.generation {
            return Ok(false);
        }

        trace!(from = self.snapshot.generation, to = latest.generation, "refreshed searcher");
        self.snapshot = latest;
        Ok(true)
    }

    fn cleanup(self: Box<Self>) {}
}

/// score of a document, `None` if it does not match
fn score(query: &Query, doc: &IndexedDocument) -> Option<u32> {
    match query {
        Query::All => Some(0),
        Query::Term { field, pattern } => doc
            .fields
            .get(field)
            .filter(|value| pattern.matches(value))
            .map(|_| 1),
        Query::Present { field } => doc.fields.get(field).map(|_| 1),
        Query::And(operands) => operands.iter().map(|q| score(q, doc)).sum(),
        Query::Or(branches) => branches
            .iter()
            .filter_map(|q| score(q, doc))
            .fold(None, |acc, s| Some(acc.unwrap_or(0) + s)),
        Query::Not(inner) => match score(inner, doc) {
            Some(_) => None,
            None => Some(0),
        },
    }
}

/// documents that can possibly match, `None` when every document has to be checked
fn candidates(query: &Query, snapshot: &IndexSnapshot) -> Option<BTreeSet<Uuid>> {
    match query {
        Query::Term { field, pattern } => {
            let literal = pattern.as_literal()?;
            Some(snapshot.lookup(field, &literal).cloned().unwrap_or_default())
        }
        Query::And(operands) => operands
            .iter()
            .filter_map(|q| candidates(q, snapshot))
            .reduce(|acc, set| acc.intersection(&set).copied().collect()),
        Query::Or(branches) => branches.iter().try_fold(BTreeSet::new(), |mut acc, q| {
            acc.extend(candidates(q, snapshot)?);
            Some(acc)
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::store::IndexWriter;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        index: PathBuf,
    }

    fn fixture(contents: &[GenericContent]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("index");
        let mut writer = IndexWriter::open(IndexStore::new(&index)).unwrap();
        for content in contents {
            writer.upsert(content).unwrap();
        }
        writer.flush().unwrap();
        Fixture { _dir: dir, index }
    }

    fn doc(props: &[(&str, &str)]) -> GenericContent {
        let mut content = GenericContent::new("/data", &["kind"], &["doc"]);
        content.ensure_uuid();
        for (k, v) in props {
            content.set_property(*k, v);
        }
        content
    }

    fn names(results: &[GenericContent]) -> Vec<&str> {
        results.iter().map(|c| c.property("name").unwrap_or("")).collect()
    }

    #[test]
    fn test_exact_and_wildcard_terms() {
        let fx = fixture(&[
            doc(&[("name", "alpha")]),
            doc(&[("name", "alpine")]),
            doc(&[("name", "beta")]),
        ]);
        let searcher = FileSearcher::open(&fx.index, Path::new("/data")).unwrap();

        assert_eq!(names(&searcher.search("name:alpha").unwrap()), ["alpha"]);
        assert_eq!(names(&searcher.search("name:alp*").unwrap()), ["alpha", "alpine"]);
        assert_eq!(names(&searcher.search("name:?eta").unwrap()), ["beta"]);
        assert!(searcher.search("name:Alpha").unwrap().is_empty());
    }

    #[test]
    fn test_match_all_keeps_insertion_order() {
        let fx = fixture(&[doc(&[("name", "1")]), doc(&[("name", "2")]), doc(&[("name", "3")])]);
        let searcher = FileSearcher::open(&fx.index, Path::new("/data")).unwrap();

        for q in ["*", "*:*", ".*"] {
            assert_eq!(names(&searcher.search(q).unwrap()), ["1", "2", "3"]);
        }
    }

    #[test]
    fn test_boolean_operators() {
        let fx = fixture(&[
            doc(&[("name", "a"), ("color", "red")]),
            doc(&[("name", "b"), ("color", "blue")]),
            doc(&[("name", "c")]),
        ]);
        let searcher = FileSearcher::open(&fx.index, Path::new("/data")).unwrap();

        assert_eq!(names(&searcher.search("name:a OR name:b").unwrap()), ["a", "b"]);
        assert_eq!(names(&searcher.search("name:a AND color:red").unwrap()), ["a"]);
        assert!(searcher.search("name:a AND color:blue").unwrap().is_empty());
        assert_eq!(names(&searcher.search("color:*").unwrap()), ["a", "b"]);
        assert_eq!(names(&searcher.search("NOT color:*").unwrap()), ["c"]);
        assert_eq!(names(&searcher.search("name:* NOT color:red").unwrap()), ["b", "c"]);
    }

    #[test]
    fn test_higher_score_ranks_first() {
        let fx = fixture(&[
            doc(&[("name", "first"), ("a", "1")]),
            doc(&[("name", "second"), ("a", "1"), ("b", "2")]),
        ]);
        let searcher = FileSearcher::open(&fx.index, Path::new("/data")).unwrap();

        let results = searcher.search("(a:1 OR b:2)").unwrap();
        assert_eq!(names(&results), ["second", "first"]);
    }

    #[test]
    fn test_results_are_rebuilt_below_content_base() {
        let original = doc(&[("name", "x")]);
        let fx = fixture(std::slice::from_ref(&original));
        let searcher = FileSearcher::open(&fx.index, Path::new("/data")).unwrap();

        let found = searcher.find(&original.uuid().unwrap()).unwrap();
        assert_eq!(found, original);
        assert_eq!(found.segments(), ["doc"]);
        assert_eq!(found.file_location().unwrap(), original.file_location().unwrap());
        assert_eq!(searcher.base_index(), fx.index.as_path());
    }

    #[test]
    fn test_uuid_is_searchable() {
        let target = doc(&[("name", "t")]);
        let fx = fixture(&[doc(&[("name", "other")]), target.clone()]);
        let searcher = FileSearcher::open(&fx.index, Path::new("/data")).unwrap();

        let query = format!("uuid:{}", target.uuid().unwrap());
        assert_eq!(searcher.search(&query).unwrap(), vec![target]);
    }

    #[test]
    fn test_refresh_sees_new_commits() {
        let fx = fixture(&[doc(&[("name", "a")])]);
        let mut searcher = FileSearcher::open(&fx.index, Path::new("/data")).unwrap();
        assert!(!searcher.refresh().unwrap());

        let mut writer = IndexWriter::open(IndexStore::new(&fx.index)).unwrap();
        writer.upsert(&doc(&[("name", "b")])).unwrap();
        writer.flush().unwrap();

        assert_eq!(searcher.len(), 1);
        assert!(searcher.refresh().unwrap());
        assert_eq!(searcher.len(), 2);
    }

    #[test]
    fn test_malformed_query_returns_error() {
        let fx = fixture(&[doc(&[("name", "a")])]);
        let searcher = FileSearcher::open(&fx.index, Path::new("/data")).unwrap();

        let err = searcher.search("name:a AND (").unwrap_err();
        assert!(err.is_query_error());
    }
}
