//!  Commit creation and history traversal
//!
//!  commits are the atomic units of change. In the EDB:
//! - every handler commit creates exactly one revision (or none, if nothing changed)
//! - resets walk the first-parent chain backwards
//! - index repair diffs the revision the index mirrors against the head
//!
//! this module handles low-level commit creation, history walking, and diff
//! operations. The caller-facing commit session lives in `session`.

use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use git2::{Delta, Diff, DiffOptions, Repository, Revwalk, Sort};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::tree::TreeHandle;
use crate::storage::types::{Change, ChangeStatus, GitSignature, RevisionId, TreeId};

/// information about a revision
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: RevisionId,
    pub tree_id: TreeId,
    pub parent_ids: Vec<RevisionId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let time = commit.time();
        let timestamp = Utc
            .timestamp_opt(time.seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: RevisionId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(RevisionId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("unknown@unknown").to_string(),
            timestamp,
        }
    }

    /// get the first (or only) parent
    pub fn first_parent(&self) -> Option<RevisionId> {
        self.parent_ids.first().copied()
    }

    /// check if this is the root revision
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// builder for writing commit objects with a fluent interface
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<TreeId>,
    parents: Vec<RevisionId>,
    message: String,
    author: GitSignature,
    committer: GitSignature,
    update_ref: Option<String>,
}

impl<'a> CommitBuilder<'a> {
    /// create a new CommitBuilder
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            author: GitSignature::edb(),
            committer: GitSignature::edb(),
            update_ref: None,
        }
    }

    /// set the tree for this commit
    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// add a parent commit
    pub fn parent(mut self, parent: RevisionId) -> Self {
        self.parents.push(parent);
        self
    }

    /// set the commit message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// set the author signature
    pub fn author(mut self, author: GitSignature) -> Self {
        self.author = author;
        self
    }

    /// set the committer signature
    pub fn committer(mut self, committer: GitSignature) -> Self {
        self.committer = committer;
        self
    }

    /// update a ref to point to this commit
    pub fn update_ref(mut self, refname: impl Into<String>) -> Self {
        self.update_ref = Some(refname.into());
        self
    }

    /// create the commit and return its ID
    pub fn commit(self) -> StorageResult<RevisionId> {
        let tree_id = self
            .tree_id
            .ok_or_else(|| StorageError::Internal("commit requires a tree".to_string()))?;

        let tree = self.repo.find_tree(tree_id.raw())?;
        let author = self.author.to_git2_signature()?;
        let committer = self.committer.to_git2_signature()?;

        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| self.repo.find_commit(id.raw()))
            .collect::<Result<_, _>>()?;

        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self.repo.commit(
            self.update_ref.as_deref(),
            &author,
            &committer,
            &self.message,
            &tree,
            &parent_refs,
        )?;

        Ok(RevisionId::new(oid))
    }
}

/// get information about a revision
pub fn get_commit(repo: &Repository, id: RevisionId) -> StorageResult<CommitInfo> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| StorageError::RevisionNotFound(id.to_string()))?;

    Ok(CommitInfo::from_git2(&commit))
}

/// get the tree snapshot at a specific revision
pub fn get_tree_at_commit(repo: &Repository, id: RevisionId) -> StorageResult<TreeHandle<'_>> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| StorageError::RevisionNotFound(id.to_string()))?;

    let tree = commit.tree()?;
    Ok(TreeHandle::new(tree))
}

/// create the root revision for a new repository
pub fn create_initial_commit(repo: &Repository, signature: &GitSignature) -> StorageResult<RevisionId> {
    let tree_id = crate::storage::tree::create_initial_tree(repo)?;

    CommitBuilder::new(repo)
        .tree(tree_id)
        .message(CommitMessage::initialize())
        .author(signature.clone())
        .committer(signature.clone())
        .update_ref("HEAD")
        .commit()
}

/// compute the diff between two revisions
///
/// returns a list of changed paths
pub fn diff_commits(repo: &Repository, old: RevisionId, new: RevisionId) -> StorageResult<Vec<Change>> {
    let old_commit = repo.find_commit(old.raw())?;
    let new_commit = repo.find_commit(new.raw())?;

    let old_tree = old_commit.tree()?;
    let new_tree = new_commit.tree()?;

    let mut opts = DiffOptions::new();
    let diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;

    extract_changes_from_diff(&diff)
}

/// compute changes from a diff
fn extract_changes_from_diff(diff: &Diff<'_>) -> StorageResult<Vec<Change>> {
    let mut changes = Vec::new();

    for delta in diff.deltas() {
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(PathBuf::from)
            .unwrap_or_default();

        let status = match delta.status() {
            Delta::Added => ChangeStatus::Added,
            Delta::Deleted => ChangeStatus::Deleted,
            Delta::Modified => ChangeStatus::Modified,
            Delta::Renamed => ChangeStatus::Renamed,
            Delta::Copied => ChangeStatus::Copied,
            _ => ChangeStatus::Other,
        };

        changes.push(Change { path, status });
    }

    Ok(changes)
}

/// iterate over revision history starting from a revision
pub struct HistoryIterator<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> HistoryIterator<'repo> {
    /// create a new history iterator
    pub fn new(repo: &'repo Repository, start: RevisionId) -> StorageResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk.push(start.raw())?;
        revwalk.set_sorting(Sort::TOPOLOGICAL)?;
        revwalk.simplify_first_parent()?;

        Ok(Self { repo, revwalk })
    }
}

impl<'repo> Iterator for HistoryIterator<'repo> {
    type Item = StorageResult<CommitInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.revwalk.next()? {
            Ok(oid) => match self.repo.find_commit(oid) {
                Ok(commit) => Some(Ok(CommitInfo::from_git2(&commit))),
                Err(e) => Some(Err(StorageError::Git(e))),
            },
            Err(e) => Some(Err(StorageError::Git(e))),
        }
    }
}

/// get history for a revision
pub fn history(repo: &Repository, start: RevisionId) -> StorageResult<HistoryIterator<'_>> {
    HistoryIterator::new(repo, start)
}

/// message formatting for EDB revisions
pub struct CommitMessage;

impl CommitMessage {
    /// default message of handler commits
    pub const DEFAULT: &'static str = "commit via EDB-API";

    /// marker line identifying the data revision an index commit mirrors
    pub const INDEX_TRAILER: &'static str = "data-revision: ";

    /// message of the root revision
    pub fn initialize() -> &'static str {
        "[edb] Initialize repository"
    }

    /// message for an index commit mirroring `data_revision`
    pub fn index_sync(data_revision: &RevisionId) -> String {
        format!("[index] sync\n\n{}{}", Self::INDEX_TRAILER, data_revision)
    }

    /// extract the data revision from an index commit message
    pub fn parse_index_sync(message: &str) -> Option<&str> {
        message
            .lines()
            .find_map(|line| line.strip_prefix(Self::INDEX_TRAILER))
            .map(str::trim)
    }
}
