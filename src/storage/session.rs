//! Commit and reset sessions.
//!
//! Both are short-lived builders borrowed from a [`GitRepository`]. A commit
//! session collects files that were already written to the working tree and
//! turns them into exactly one revision; a reset session moves the head back
//! along the first-parent chain.
//!
//! ```ignore
//! let rev = repo
//!     .prepare_commit()
//!     .add(&content)
//!     .set_author("alice", "alice@x.org")
//!     .set_message("commit via EDB-API")
//!     .commit()?;
//!
//! let rev = repo.prepare_reset().depth(2).expect_head(&rev.to_string()).reset()?;
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{Repository, Status, StatusOptions};
use tracing::{debug, trace};

use crate::content::GenericContent;
use crate::storage::blob;
use crate::storage::commit::{self, CommitBuilder};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::repository::GitRepository;
use crate::storage::tree::TreeUpdate;
use crate::storage::types::{GitSignature, ResetMode, RevisionId};

enum Staged {
    Upsert(PathBuf),
    Delete,
}

/// A pending revision.
///
/// Staging the same path twice keeps the last operation. Errors found while
/// staging are reported by [`Commit::commit`].
pub struct Commit<'r> {
    repo: &'r GitRepository,
    staged: BTreeMap<String, Staged>,
    author: Option<GitSignature>,
    message: Option<String>,
    error: Option<StorageError>,
}

impl<'r> Commit<'r> {
    pub(crate) fn new(repo: &'r GitRepository) -> Self {
        Self {
            repo,
            staged: BTreeMap::new(),
            author: None,
            message: None,
            error: None,
        }
    }

    /// stage the stored state of a content
    pub fn add(self, content: &GenericContent) -> Self {
        match content.file_location() {
            Ok(file) => self.add_file(file),
            Err(e) => self.fail(e.into()),
        }
    }

    /// stage the deletion of a content
    pub fn delete(self, content: &GenericContent) -> Self {
        match content.tree_path() {
            Ok(path) => self.stage(path, Staged::Delete),
            Err(e) => self.fail(e.into()),
        }
    }

    /// stage working tree files by absolute path
    pub fn add_files<I, P>(self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        files
            .into_iter()
            .fold(self, |session, file| session.add_file(file.as_ref().to_path_buf()))
    }

    /// stage the deletion of working tree files by absolute path
    pub fn delete_files<I, P>(self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        files.into_iter().fold(self, |session, file| {
            match session.repo.tree_path_of(file.as_ref()) {
                Ok(path) => session.stage(path, Staged::Delete),
                Err(e) => session.fail(e),
            }
        })
    }

    pub fn set_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author = Some(GitSignature::new(name, email));
        self
    }

    pub fn set_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// number of staged paths
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Finalize the session.
    ///
    /// Returns the new revision, or the current head when the resulting tree
    /// equals the head tree. The git index is synchronized with the new tree
    /// so the working tree reads as clean afterwards.
    pub fn commit(self) -> StorageResult<RevisionId> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let author = self.author.ok_or(StorageError::IncompleteCommit("author"))?;
        let message = self.message.ok_or(StorageError::IncompleteCommit("message"))?;
        let committer = self.repo.signature().clone();
        let staged = self.staged;

        self.repo.with_repo(|repo| {
            let head = RefManager::head_commit(repo)?;
            let baseline = commit::get_tree_at_commit(repo, head)?;

            let mut update = TreeUpdate::new();
            for (path, op) in &staged {
                match op {
                    Staged::Upsert(file) => {
                        let blob_id = blob::write_blob_from_file(repo, file)?;
                        update.upsert(path, blob_id);
                    }
                    Staged::Delete if baseline.contains(path) => update.remove(path),
                    Staged::Delete => trace!(path = %path, "skipping delete of untracked path"),
                }
            }

            if update.is_empty() {
                debug!("nothing staged, head stays at {}", head.short());
                return Ok(head);
            }

            let tree_id = update.write(repo, &baseline)?;
            if tree_id == baseline.id() {
                debug!("tree unchanged, head stays at {}", head.short());
                return Ok(head);
            }

            let revision = CommitBuilder::new(repo)
                .tree(tree_id)
                .parent(head)
                .message(message)
                .author(author)
                .committer(committer)
                .update_ref("HEAD")
                .commit()?;

            let tree = repo.find_tree(tree_id.raw())?;
            let mut index = repo.index()?;
            index.read_tree(&tree)?;
            index.write()?;

            debug!(files = staged.len(), "created revision {}", revision.short());
            Ok(revision)
        })
    }

    fn add_file(self, file: PathBuf) -> Self {
        match self.repo.tree_path_of(&file) {
            Ok(path) => self.stage(path, Staged::Upsert(file)),
            Err(e) => self.fail(e),
        }
    }

    fn stage(mut self, path: String, op: Staged) -> Self {
        self.staged.insert(path, op);
        self
    }

    fn fail(mut self, error: StorageError) -> Self {
        self.error.get_or_insert(error);
        self
    }
}

/// A pending move of the head along its first-parent chain.
pub struct Reset<'r> {
    repo: &'r GitRepository,
    depth: usize,
    mode: ResetMode,
    expected: Option<String>,
}

impl<'r> Reset<'r> {
    pub(crate) fn new(repo: &'r GitRepository) -> Self {
        Self {
            repo,
            depth: 0,
            mode: ResetMode::default(),
            expected: None,
        }
    }

    /// how many revisions to step back
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn mode(mut self, mode: ResetMode) -> Self {
        self.mode = mode;
        self
    }

    /// only reset if the head still is `head`
    pub fn expect_head(mut self, head: impl Into<String>) -> Self {
        self.expected = Some(head.into());
        self
    }

    /// Perform the reset and return the new head.
    ///
    /// A hard reset also deletes untracked files, so `depth(0)` restores the
    /// working tree to the head revision.
    pub fn reset(self) -> StorageResult<RevisionId> {
        let Reset { repo, depth, mode, expected } = self;

        repo.with_repo(|git| {
            let head = match &expected {
                Some(expected) => RefManager::ensure_head(git, expected)?,
                None => RefManager::head_commit(git)?,
            };
            let target = RefManager::nth_ancestor(git, head, depth)?;

            let object = git.find_object(target.raw(), None)?;
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            git.reset(&object, mode.to_git2(), Some(&mut checkout))?;

            if mode == ResetMode::Hard {
                remove_untracked(git, repo.path())?;
            }

            debug!(depth, ?mode, "reset {} -> {}", head.short(), target.short());
            Ok(target)
        })
    }
}

/// delete untracked files and the directories they leave empty
fn remove_untracked(repo: &Repository, workdir: &Path) -> StorageResult<()> {
    let mut options = StatusOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);

    let untracked: Vec<PathBuf> = repo
        .statuses(Some(&mut options))?
        .iter()
        .filter(|entry| entry.status().contains(Status::WT_NEW))
        .filter_map(|entry| entry.path().map(|p| workdir.join(p)))
        .collect();

    for file in &untracked {
        trace!(path = %file.display(), "removing untracked file");
        fs::remove_file(file)?;
    }

    prune_empty_dirs(workdir, workdir)?;
    Ok(())
}

/// remove directories below `dir` that hold no files; returns whether `dir` is empty
fn prune_empty_dirs(dir: &Path, workdir: &Path) -> StorageResult<bool> {
    let mut empty = true;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() && entry.file_name() != ".git" {
            if prune_empty_dirs(&path, workdir)? {
                fs::remove_dir(&path)?;
            } else {
                empty = false;
            }
        } else {
            empty = false;
        }
    }

    Ok(empty && dir != workdir)
}

/// turn a path relative to the working tree into a `/`-separated tree path
pub(crate) fn to_tree_path(relative: &Path) -> Option<String> {
    let parts: Option<Vec<&str>> = relative
        .components()
        .map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();

    parts.filter(|p| !p.is_empty()).map(|p| p.join("/"))
}
