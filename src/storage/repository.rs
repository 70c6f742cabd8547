//!   Core Git repository wrapper.
//!
//!  This is the central component of the storage layer. It wraps
//!  `git2::Repository` with thread-safe access and provides the operations the
//!  handler needs: commit and reset sessions, revision resolution, history,
//!  and read access to committed content.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{Repository, RepositoryInitOptions};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::storage::blob;
use crate::storage::commit::{self, CommitInfo};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::session::{self, Commit, Reset};
use crate::storage::types::{Change, GitSignature, RevisionId};

/// The main Git repository wrapper.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

struct GitRepositoryInner {
    repo: Mutex<Repository>,
    path: PathBuf,
    signature: GitSignature,
}

impl GitRepository {
    /// Open an existing repository.
    ///
    /// A repository without any revision gets its root revision here.
    pub fn open(path: impl AsRef<Path>, signature: GitSignature) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|_| StorageError::NotInitialized(path.to_path_buf()))?;

        if repo.is_bare() {
            return Err(StorageError::BareRepository(path.to_path_buf()));
        }

        if let Err(StorageError::EmptyRepository) = RefManager::head_commit(&repo) {
            commit::create_initial_commit(&repo, &signature)?;
        }

        Ok(Self::wrap(repo, path, signature))
    }

    /// Initialize a new repository with an empty root revision.
    pub fn init(path: impl AsRef<Path>, signature: GitSignature) -> StorageResult<Self> {
        let path = path.as_ref();

        let mut options = RepositoryInitOptions::new();
        options.initial_head("main").mkpath(true);
        let repo = Repository::init_opts(path, &options)?;

        let root = commit::create_initial_commit(&repo, &signature)?;
        info!(path = %path.display(), "initialized repository at {}", root.short());

        Ok(Self::wrap(repo, path, signature))
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>, signature: GitSignature) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() {
            Self::open(path, signature)
        } else {
            Self::init(path, signature)
        }
    }

    fn wrap(repo: Repository, path: &Path, signature: GitSignature) -> Self {
        Self {
            inner: Arc::new(GitRepositoryInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
                signature,
            }),
        }
    }

    /// The working tree root.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Committer identity of every revision written through this handle.
    pub fn signature(&self) -> &GitSignature {
        &self.inner.signature
    }

    /// Execute a function with exclusive access to the repository.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    // ==================== Revisions ====================

    /// Get the current head revision.
    pub fn head(&self) -> StorageResult<RevisionId> {
        self.with_repo(RefManager::head_commit)
    }

    /// Resolve `HEAD`, `HEAD~n` or a (short) revision id.
    pub fn resolve(&self, revspec: &str) -> StorageResult<RevisionId> {
        self.with_repo(|repo| RefManager::resolve(repo, revspec))
    }

    /// Get information about a revision.
    pub fn get_commit(&self, id: RevisionId) -> StorageResult<CommitInfo> {
        self.with_repo(|repo| commit::get_commit(repo, id))
    }

    /// Get revision history, newest first.
    pub fn history(&self, from: RevisionId, limit: Option<usize>) -> StorageResult<Vec<CommitInfo>> {
        self.with_repo(|repo| {
            let iter = commit::history(repo, from)?;
            match limit {
                Some(n) => iter.take(n).collect(),
                None => iter.collect(),
            }
        })
    }

    /// Get the changed paths between two revisions.
    pub fn diff(&self, old: RevisionId, new: RevisionId) -> StorageResult<Vec<Change>> {
        self.with_repo(|repo| commit::diff_commits(repo, old, new))
    }

    // ==================== Sessions ====================

    /// Begin a commit session.
    pub fn prepare_commit(&self) -> Commit<'_> {
        Commit::new(self)
    }

    /// Begin a reset session.
    pub fn prepare_reset(&self) -> Reset<'_> {
        Reset::new(self)
    }

    // ==================== Committed content ====================

    /// Every file of a revision as (tree path, bytes) pairs.
    pub fn contents_at(&self, at: RevisionId) -> StorageResult<Vec<(String, Vec<u8>)>> {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, at)?;
            tree.files()?
                .into_iter()
                .map(|(path, blob_id)| blob::read_blob(repo, blob_id).map(|bytes| (path, bytes)))
                .collect()
        })
    }

    /// Read one file of a revision.
    pub fn read_file(&self, at: RevisionId, path: &str) -> StorageResult<Option<Vec<u8>>> {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, at)?;
            match tree.blob_at(path)? {
                Some(blob_id) => Ok(Some(blob::read_blob(repo, blob_id)?)),
                None => Ok(None),
            }
        })
    }

    /// Names of the directories below `segments` in a revision.
    pub fn child_directories(&self, at: RevisionId, segments: &[&str]) -> StorageResult<Vec<String>> {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, at)?;
            tree.child_directories(repo, segments)
        })
    }

    /// Delete the working tree and all version-control metadata.
    pub fn remove_repository(self) -> StorageResult<()> {
        let path = self.inner.path.clone();
        drop(self);

        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        info!(path = %path.display(), "removed repository");
        Ok(())
    }

    /// map an absolute working tree path to its tree path
    pub(crate) fn tree_path_of(&self, file: &Path) -> StorageResult<String> {
        let outside = || StorageError::OutsideRepository {
            path: file.to_path_buf(),
            root: self.inner.path.clone(),
        };

        let relative = file.strip_prefix(&self.inner.path).map_err(|_| outside())?;
        session::to_tree_path(relative).ok_or_else(outside)
    }
}

impl fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitRepository")
            .field("path", &self.inner.path)
            .field("signature", &self.inner.signature)
            .finish()
    }
}

/// Loads repositories by path.
///
/// The handler is wired with one factory for the data store and one for the
/// index store.
pub trait RepositoryFactory: Send + Sync {
    /// open the repository at `path`; repeated calls return equivalent handles
    fn load_repository(&self, path: &Path) -> StorageResult<GitRepository>;
}

/// Factory for on-disk git repositories.
#[derive(Debug, Clone)]
pub struct GitRepositoryFactory {
    signature: GitSignature,
    create_if_missing: bool,
}

impl GitRepositoryFactory {
    pub fn new(signature: GitSignature) -> Self {
        Self {
            signature,
            create_if_missing: true,
        }
    }

    /// fail with `NotInitialized` instead of creating missing repositories
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

impl Default for GitRepositoryFactory {
    fn default() -> Self {
        Self::new(GitSignature::default())
    }
}

impl RepositoryFactory for GitRepositoryFactory {
    fn load_repository(&self, path: &Path) -> StorageResult<GitRepository> {
        debug!(path = %path.display(), create = self.create_if_missing, "loading repository");
        if self.create_if_missing {
            GitRepository::open_or_init(path, self.signature.clone())
        } else {
            GitRepository::open(path, self.signature.clone())
        }
    }
}
