//! The EDB handler.
//!
//! The handler owns a data repository holding one file per content, an
//! index repository holding the field index, and the index factory used to
//! read and write that index. Callers stage changes with [`EdbHandler::add`]
//! and [`EdbHandler::remove`] and persist them as one revision with
//! [`EdbHandler::commit`]. Every method runs under one lock, so calls from
//! several threads are serialized.
//!
//! The index records the data revision it mirrors. Whenever that differs
//! from the data head (an index update failed, a reset happened, or another
//! process committed) the handler resynchronizes it: from the diff between
//! the two revisions when the recorded one is known, otherwise by rebuilding
//! it from every content of the head.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::content::{codec, GenericContent, HEAD_KEY, NAME_KEY};
use crate::edb::config::{EdbConfig, DATA_DIR, INDEX_DIR};
use crate::edb::error::{EdbError, EdbResult};
use crate::edb::pending::{PendingOp, PendingSet};
use crate::search::{FileIndexFactory, IndexFactory, Indexer, INDEX_FILE};
use crate::storage::{
    ChangeStatus, CommitInfo, CommitMessage, GitRepository, GitRepositoryFactory, RepositoryFactory,
    RevisionId, StorageError,
};

/// Lifecycle phase of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// nothing staged
    Idle,
    /// changes staged since the last commit
    Staging,
    /// a commit is running
    Committing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Staging => "staging",
            Phase::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// Wires the repositories and the index of a handler.
pub struct EdbHandlerBuilder {
    config: EdbConfig,
    data_factory: Option<Box<dyn RepositoryFactory>>,
    index_repository_factory: Option<Box<dyn RepositoryFactory>>,
    index_factory: Option<Box<dyn IndexFactory>>,
}

impl EdbHandlerBuilder {
    /// factory of the content repository
    pub fn data_repository_factory(mut self, factory: impl RepositoryFactory + 'static) -> Self {
        self.data_factory = Some(Box::new(factory));
        self
    }

    /// factory of the repository the index is versioned in
    pub fn index_repository_factory(mut self, factory: impl RepositoryFactory + 'static) -> Self {
        self.index_repository_factory = Some(Box::new(factory));
        self
    }

    /// factory of indexers and searchers
    pub fn index_factory(mut self, factory: impl IndexFactory + 'static) -> Self {
        self.index_factory = Some(Box::new(factory));
        self
    }

    /// Open the repositories and bring the index up to date.
    ///
    /// A failing index resync does not fail the open; the next commit
    /// retries it.
    pub fn open(self) -> EdbResult<EdbHandler> {
        let config = self.config;
        config.validate()?;

        let root = config.resolved_root()?;
        if config.create_if_missing {
            fs::create_dir_all(&root)?;
        }

        let default_factory = || {
            Box::new(
                GitRepositoryFactory::new(config.committer.clone()).create_if_missing(config.create_if_missing),
            ) as Box<dyn RepositoryFactory>
        };
        let data_factory = self.data_factory.unwrap_or_else(default_factory);
        let index_repository_factory = self.index_repository_factory.unwrap_or_else(default_factory);
        let index_factory = self
            .index_factory
            .unwrap_or_else(|| Box::new(FileIndexFactory));

        let data = data_factory.load_repository(&root.join(DATA_DIR))?;
        let index = index_repository_factory.load_repository(&root.join(INDEX_DIR))?;

        let head = data.head()?;
        let indexed_revision = {
            let searcher = index_factory.create_searcher(index.path(), data.path())?;
            let revision = searcher.indexed_revision().map(str::to_string);
            searcher.cleanup();
            revision
        };

        let mut state = State {
            data,
            index,
            index_factory,
            commit_message: config.commit_message.clone(),
            pending: PendingSet::default(),
            phase: Phase::Idle,
            head_info: head.to_string(),
            indexed_revision,
            unindexed: None,
        };

        if !state.index_in_sync(&head) {
            if let Err(e) = state.sync_index(head) {
                warn!(error = %e, "index is behind revision {}, repair deferred", head.short());
            }
        }

        info!(root = %root.display(), head = %head.short(), "opened EDB");
        Ok(EdbHandler {
            root,
            data_path: state.data.path().to_path_buf(),
            index_path: state.index.path().to_path_buf(),
            state: Mutex::new(state),
        })
    }
}

/// The EDB handler.
pub struct EdbHandler {
    root: PathBuf,
    data_path: PathBuf,
    index_path: PathBuf,
    state: Mutex<State>,
}

struct State {
    data: GitRepository,
    index: GitRepository,
    index_factory: Box<dyn IndexFactory>,
    commit_message: String,
    pending: PendingSet,
    phase: Phase,
    head_info: String,
    /// data revision the committed index mirrors
    indexed_revision: Option<String>,
    /// revision written by a commit whose index update failed
    unindexed: Option<RevisionId>,
}

impl EdbHandler {
    /// Start wiring a handler.
    pub fn builder(config: EdbConfig) -> EdbHandlerBuilder {
        EdbHandlerBuilder {
            config,
            data_factory: None,
            index_repository_factory: None,
            index_factory: None,
        }
    }

    /// Open a handler with the default git repositories and file index.
    pub fn open(config: EdbConfig) -> EdbResult<Self> {
        Self::builder(config).open()
    }

    // ==================== Staging ====================

    /// Stage contents for the next commit.
    ///
    /// Contents without uuid get a random one, written back into `contents`.
    /// Contents with invalid path segments are skipped with a warning.
    /// Contents are moved below the data repository if they point elsewhere.
    pub fn add(&self, contents: &mut [GenericContent]) -> EdbResult<&Self> {
        let mut state = self.state.lock();

        for content in contents.iter_mut() {
            if let Err(e) = content.validate() {
                warn!(error = %e, "skipping invalid content");
                continue;
            }
            if content.repository_base() != self.data_path.as_path() {
                content.set_repository_base(&self.data_path);
            }

            let uuid = content.ensure_uuid();
            debug!(%uuid, "staged add");
            state.pending.stage(uuid, PendingOp::Add(content.clone()));
        }

        state.phase = Phase::Staging;
        Ok(self)
    }

    /// Stage contents for removal. Contents without uuid are skipped.
    pub fn remove(&self, contents: &[GenericContent]) -> EdbResult<&Self> {
        let mut state = self.state.lock();

        for content in contents {
            let Some(uuid) = content.uuid() else {
                warn!("skipping removal of content without uuid");
                continue;
            };

            let mut content = content.clone();
            content.set_repository_base(&self.data_path);
            debug!(%uuid, "staged remove");
            state.pending.stage(uuid, PendingOp::Remove(content));
        }

        state.phase = Phase::Staging;
        Ok(self)
    }

    /// Discard every staged change.
    pub fn reset_to_current(&self) -> &Self {
        let mut state = self.state.lock();
        if !state.pending.is_empty() {
            debug!(discarded = state.pending.len(), "dropped pending changes");
        }
        state.pending.clear();
        state.phase = Phase::Idle;
        self
    }

    // ==================== Revisions ====================

    /// Persist the staged changes as one revision and update the index.
    ///
    /// Returns the new head. Without staged changes nothing is committed and
    /// the current head is returned; a pending index repair still runs.
    ///
    /// A repository failure restores the working tree and keeps the staged
    /// changes. An index failure after the revision was written returns
    /// [`EdbError::IndexOutOfSync`]: the revision stays, the staged changes
    /// and the head info are kept, and the next commit repairs the index
    /// without writing the revision again.
    pub fn commit(&self, user: &str, email: &str) -> EdbResult<String> {
        let mut state = self.state.lock();
        state.phase = Phase::Committing;

        let result = state.commit(user, email);

        state.phase = if state.pending.is_empty() {
            Phase::Idle
        } else {
            Phase::Staging
        };
        result
    }

    /// Undo the last `steps` revisions if `head_info` is still the head.
    ///
    /// `head_info` is checked against [`EdbHandler::head_info`]. A revision
    /// left behind by a commit whose index update failed is not part of that
    /// head; it belongs to the staged changes and is dropped together with
    /// them, so `steps == 0` removes it as well.
    ///
    /// A failing repository reset leaves everything as it was, staged
    /// changes included. Once the repository is reset the staged changes are
    /// gone and the head info follows the restored revision; if the index
    /// then fails to follow, [`EdbError::IndexOutOfSync`] is returned and the
    /// next commit repairs the index.
    pub fn reset(&self, head_info: &str, steps: usize) -> EdbResult<String> {
        let mut state = self.state.lock();
        state.reset(head_info, steps)
    }

    /// The current revision of the data repository.
    pub fn head_info(&self) -> String {
        self.state.lock().head_info.clone()
    }

    /// Revisions of the data repository, newest first.
    pub fn history(&self, limit: Option<usize>) -> EdbResult<Vec<CommitInfo>> {
        let state = self.state.lock();
        let head = state.data.head()?;
        Ok(state.data.history(head, limit)?)
    }

    // ==================== Queries ====================

    /// Run a query against the index.
    ///
    /// With `head_revision` the first element carries only the `HEAD`
    /// property holding the current revision; the matches follow it.
    pub fn query(&self, query: &str, head_revision: bool) -> EdbResult<Vec<GenericContent>> {
        let state = self.state.lock();
        debug!(query, head_revision, "preparing query");

        let searcher = state
            .index_factory
            .create_searcher(&self.index_path, &self.data_path)?;
        let result = searcher.search(query);
        searcher.cleanup();
        let mut results = result?;

        if head_revision {
            let mut head = GenericContent::detached();
            head.set_property(HEAD_KEY, &state.head_info);
            results.insert(0, head);
        }

        debug!(query, hits = results.len(), "query finished");
        Ok(results)
    }

    /// Directory names below `path` in the head revision, each carried in a
    /// content holding only the `name` property. Segments match
    /// case-insensitively.
    pub fn query_nodes(&self, path: &[&str]) -> EdbResult<Vec<GenericContent>> {
        let state = self.state.lock();
        let head = state.data.head()?;

        let nodes = state
            .data
            .child_directories(head, path)?
            .into_iter()
            .map(|name| {
                let mut node = GenericContent::detached();
                node.set_property(NAME_KEY, name);
                node
            })
            .collect();
        Ok(nodes)
    }

    /// Rebuild the index from every content of the head.
    pub fn rebuild_index(&self) -> EdbResult<()> {
        let mut state = self.state.lock();
        let head = state.data.head()?;
        state.indexed_revision = None;
        state.sync_index(head)
    }

    // ==================== Introspection ====================

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// number of staged changes
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// working tree of the data repository
    pub fn repository_base(&self) -> &Path {
        &self.data_path
    }

    /// working tree of the index repository
    pub fn base_index(&self) -> &Path {
        &self.index_path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete both repositories, and the root if nothing else is left in it.
    pub fn remove_repository(self) -> EdbResult<()> {
        let state = self.state.into_inner();
        state.data.remove_repository()?;
        state.index.remove_repository()?;

        match fs::remove_dir(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => debug!(error = %e, "keeping non-empty root"),
        }
        info!(root = %self.root.display(), "removed EDB");
        Ok(())
    }
}

impl fmt::Debug for EdbHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdbHandler")
            .field("root", &self.root)
            .field("data", &self.data_path)
            .field("index", &self.index_path)
            .finish()
    }
}

impl State {
    fn index_in_sync(&self, head: &RevisionId) -> bool {
        self.indexed_revision.as_deref() == Some(head.to_string().as_str())
    }

    fn commit(&mut self, user: &str, email: &str) -> EdbResult<String> {
        let head = self.data.head()?;
        let in_sync = self.index_in_sync(&head);

        if self.pending.is_empty() {
            if !in_sync {
                self.sync_index(head).map_err(|e| out_of_sync(head, e))?;
            }
            self.head_info = head.to_string();
            self.unindexed = None;
            debug!("nothing to commit, head stays at {}", head.short());
            return Ok(self.head_info.clone());
        }

        let ops = self.pending.ordered();
        let revision = match self.write_revision(&ops, user, email) {
            Ok(revision) => revision,
            Err(e) => {
                error!(error = %e, "commit failed, restoring working tree");
                if let Err(reset_error) = self.data.prepare_reset().reset() {
                    error!(error = %reset_error, "failed to restore working tree");
                }
                return Err(e);
            }
        };

        let indexed = if in_sync {
            self.apply_to_index(&ops, revision)
        } else {
            self.sync_index(revision)
        };
        if let Err(e) = indexed {
            error!(error = %e, "revision {} written, index update failed", revision.short());
            self.unindexed = Some(revision);
            return Err(out_of_sync(revision, e));
        }

        self.pending.clear();
        self.unindexed = None;
        self.indexed_revision = Some(revision.to_string());
        self.head_info = revision.to_string();
        info!(user, changes = ops.len(), "committed revision {}", revision.short());
        Ok(self.head_info.clone())
    }

    fn reset(&mut self, head_info: &str, steps: usize) -> EdbResult<String> {
        if head_info != self.head_info {
            return Err(EdbError::StaleHead {
                expected: head_info.to_string(),
                actual: self.head_info.clone(),
            });
        }

        let current = self.data.head()?;
        let unindexed = self.unindexed.filter(|rev| *rev == current);
        if unindexed.is_none() && current.to_string() != self.head_info {
            return Err(EdbError::StaleHead {
                expected: head_info.to_string(),
                actual: current.to_string(),
            });
        }

        let depth = steps + usize::from(unindexed.is_some());
        if depth == 0 {
            self.pending.clear();
            self.phase = Phase::Idle;
            return Ok(self.head_info.clone());
        }

        let target = self
            .data
            .prepare_reset()
            .depth(depth)
            .expect_head(current.to_string())
            .reset()
            .map_err(|e| match e {
                StorageError::StaleHead { expected, actual } => EdbError::StaleHead {
                    expected,
                    actual: actual.to_string(),
                },
                other => EdbError::Storage(other),
            })?;

        self.pending.clear();
        self.phase = Phase::Idle;
        self.unindexed = None;
        self.head_info = target.to_string();
        info!(steps, "reset {} -> {}", current.short(), target.short());

        if !self.index_in_sync(&target) {
            self.sync_index(target).map_err(|e| {
                error!(error = %e, "index resync after reset failed");
                out_of_sync(target, e)
            })?;
        }
        Ok(self.head_info.clone())
    }

    /// store the staged changes in the working tree and commit them
    fn write_revision(&self, ops: &[PendingOp], user: &str, email: &str) -> EdbResult<RevisionId> {
        let searcher = self
            .index_factory
            .create_searcher(self.index.path(), self.data.path())?;
        let mut session = self.data.prepare_commit();

        for op in ops {
            let previous = op.content().uuid().and_then(|uuid| searcher.find(&uuid));

            match op {
                PendingOp::Add(content) => {
                    if let Some(previous) = previous.filter(|p| p.tree_path().ok() != content.tree_path().ok()) {
                        remove_file(&previous.file_location()?)?;
                        session = session.delete(&previous);
                    }
                    content.store()?;
                    session = session.add(content);
                }
                PendingOp::Remove(content) => {
                    // the indexed location wins over whatever the caller passed
                    let target = previous.as_ref().unwrap_or(content);
                    remove_file(&target.file_location()?)?;
                    session = session.delete(target);
                }
            }
        }
        searcher.cleanup();

        Ok(session
            .set_author(user, email)
            .set_message(self.commit_message.as_str())
            .commit()?)
    }

    /// apply the committed changes to an index that mirrored their parent
    fn apply_to_index(&mut self, ops: &[PendingOp], revision: RevisionId) -> EdbResult<()> {
        let mut indexer = self.index_factory.create_indexer(self.index.path())?;
        let applied = apply_ops(indexer.as_mut(), ops, revision);
        self.finish_index_update(indexer, applied, revision)
    }

    /// bring the index to `target`, incrementally when possible
    fn sync_index(&mut self, target: RevisionId) -> EdbResult<()> {
        let from = self
            .indexed_revision
            .as_deref()
            .and_then(|rev| self.data.resolve(rev).ok());

        let mut indexer = self.index_factory.create_indexer(self.index.path())?;
        let applied = match from {
            Some(from) => self.apply_diff(indexer.as_mut(), from, target),
            None => self.apply_full(indexer.as_mut(), target),
        };

        self.finish_index_update(indexer, applied, target)
    }

    fn apply_diff(&self, indexer: &mut dyn Indexer, from: RevisionId, target: RevisionId) -> EdbResult<()> {
        let mut added = Vec::new();
        let mut removed = 0;

        for change in self.data.diff(from, target)? {
            let Some(path) = change.path.to_str().map(|p| p.replace('\\', "/")) else {
                continue;
            };
            let Some(uuid) = uuid_of(&path) else {
                warn!(path = %path, "ignoring non-content file");
                continue;
            };

            match change.status {
                ChangeStatus::Deleted => {
                    let mut gone = GenericContent::detached();
                    gone.set_uuid(uuid);
                    indexer.remove_document(&gone)?;
                    removed += 1;
                }
                _ => {
                    if let Some(bytes) = self.data.read_file(target, &path)? {
                        added.push(codec::decode(&bytes, self.data.path(), Some(&uuid), Path::new(&path))?);
                    }
                }
            }
        }

        indexer.add_documents(&added)?;
        indexer.mark_revision(&target.to_string());
        debug!(added = added.len(), removed, "index resync {} -> {}", from.short(), target.short());
        Ok(())
    }

    fn apply_full(&self, indexer: &mut dyn Indexer, target: RevisionId) -> EdbResult<()> {
        let mut contents = Vec::new();
        for (path, bytes) in self.data.contents_at(target)? {
            let Some(uuid) = uuid_of(&path) else {
                warn!(path = %path, "ignoring non-content file");
                continue;
            };
            contents.push(codec::decode(&bytes, self.data.path(), Some(&uuid), Path::new(&path))?);
        }

        indexer.writer().clear();
        indexer.add_documents(&contents)?;
        indexer.mark_revision(&target.to_string());
        info!(documents = contents.len(), "rebuilt index at {}", target.short());
        Ok(())
    }

    /// commit or discard the indexer, then version the index file
    fn finish_index_update(
        &mut self,
        indexer: Box<dyn Indexer>,
        applied: EdbResult<()>,
        revision: RevisionId,
    ) -> EdbResult<()> {
        if let Err(e) = applied {
            indexer.cleanup();
            return Err(e);
        }
        indexer.commit()?;

        let signature = self.index.signature().clone();
        self.index
            .prepare_commit()
            .add_files([self.index.path().join(INDEX_FILE)])
            .set_author(signature.name, signature.email)
            .set_message(CommitMessage::index_sync(&revision))
            .commit()?;

        self.indexed_revision = Some(revision.to_string());
        Ok(())
    }
}

fn apply_ops(indexer: &mut dyn Indexer, ops: &[PendingOp], revision: RevisionId) -> EdbResult<()> {
    let mut added = Vec::new();
    for op in ops {
        match op {
            PendingOp::Remove(content) => indexer.remove_document(content)?,
            PendingOp::Add(content) => added.push(content.clone()),
        }
    }
    indexer.add_documents(&added)?;
    indexer.mark_revision(&revision.to_string());
    Ok(())
}

fn out_of_sync(revision: RevisionId, source: EdbError) -> EdbError {
    EdbError::IndexOutOfSync {
        revision: revision.to_string(),
        source: Box::new(source),
    }
}

/// content files are named after their uuid
fn uuid_of(tree_path: &str) -> Option<Uuid> {
    tree_path
        .rsplit('/')
        .next()
        .and_then(|name| Uuid::parse_str(name).ok())
}

fn remove_file(path: &Path) -> EdbResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> EdbHandler {
        EdbHandler::open(EdbConfig::new(dir.path().join("edb"))).unwrap()
    }

    fn content(handler: &EdbHandler, segments: &[&str]) -> GenericContent {
        let names: Vec<String> = (0..segments.len()).map(|i| format!("n{}", i)).collect();
        GenericContent::new(handler.repository_base(), &names, segments)
    }

    #[test]
    fn test_phases() {
        let dir = TempDir::new().unwrap();
        let handler = open(&dir);
        assert_eq!(handler.phase(), Phase::Idle);

        handler.add(&mut [content(&handler, &["a"])]).unwrap();
        assert_eq!(handler.phase(), Phase::Staging);
        assert_eq!(handler.pending_len(), 1);

        handler.commit("u", "u@x").unwrap();
        assert_eq!(handler.phase(), Phase::Idle);
        assert_eq!(handler.pending_len(), 0);
    }

    #[test]
    fn test_add_assigns_uuid_and_rebases() {
        let dir = TempDir::new().unwrap();
        let handler = open(&dir);

        let mut contents = [GenericContent::new("/elsewhere", &["n"], &["v"])];
        handler.add(&mut contents).unwrap();

        assert!(contents[0].uuid().is_some());
        assert_eq!(contents[0].repository_base(), handler.repository_base());
    }

    #[test]
    fn test_invalid_content_is_skipped() {
        let dir = TempDir::new().unwrap();
        let handler = open(&dir);

        let mut contents = [content(&handler, &[".."]), content(&handler, &["ok"])];
        handler.add(&mut contents).unwrap();

        assert_eq!(handler.pending_len(), 1);
        assert!(contents[0].uuid().is_none());
    }

    #[test]
    fn test_moved_content_leaves_old_location() {
        let dir = TempDir::new().unwrap();
        let handler = open(&dir);

        let mut contents = [content(&handler, &["old"])];
        handler.add(&mut contents).unwrap();
        handler.commit("u", "u@x").unwrap();
        let old_file = contents[0].file_location().unwrap();
        assert!(old_file.exists());

        let mut moved = GenericContent::new(handler.repository_base(), &["n0"], &["new"]);
        moved.set_uuid(contents[0].uuid().unwrap());
        handler.add(std::slice::from_mut(&mut moved)).unwrap();
        handler.commit("u", "u@x").unwrap();

        assert!(!old_file.exists());
        assert!(moved.file_location().unwrap().exists());
        let nodes = handler.query_nodes(&[]).unwrap();
        let names: Vec<&str> = nodes.iter().filter_map(|n| n.property(NAME_KEY)).collect();
        assert_eq!(names, ["new"]);
    }

    #[test]
    fn test_reopen_keeps_head_and_index() {
        let dir = TempDir::new().unwrap();
        let head = {
            let handler = open(&dir);
            handler.add(&mut [content(&handler, &["a"])]).unwrap();
            handler.commit("u", "u@x").unwrap()
        };

        let handler = open(&dir);
        assert_eq!(handler.head_info(), head);
        assert_eq!(handler.query("n0:a", false).unwrap().len(), 1);
    }

    #[test]
    fn test_rebuild_index() {
        let dir = TempDir::new().unwrap();
        let handler = open(&dir);
        handler
            .add(&mut [content(&handler, &["a"]), content(&handler, &["b"])])
            .unwrap();
        handler.commit("u", "u@x").unwrap();

        fs::remove_file(handler.base_index().join(INDEX_FILE)).unwrap();
        assert!(handler.query("*", false).unwrap().is_empty());

        handler.rebuild_index().unwrap();
        assert_eq!(handler.query("*", false).unwrap().len(), 2);
    }

    #[test]
    fn test_uuid_of() {
        let uuid = Uuid::new_v4();
        assert_eq!(uuid_of(&format!("a/b/{}", uuid)), Some(uuid));
        assert_eq!(uuid_of(&uuid.to_string()), Some(uuid));
        assert_eq!(uuid_of("a/readme"), None);
    }
}
