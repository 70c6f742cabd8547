//! Reference and revision resolution.
//!
//! The EDB works on a single line of history, so this module only needs to
//! answer three questions: where is HEAD, what does a revision string point
//! at, and which revision lies `n` first-parent steps behind another.

use git2::Repository;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::RevisionId;

/// Resolves references to revisions.
pub struct RefManager;

impl RefManager {
    /// Get the current HEAD revision.
    pub fn head_commit(repo: &Repository) -> StorageResult<RevisionId> {
        let head = repo.head().map_err(|e| {
            if e.code() == git2::ErrorCode::UnbornBranch {
                StorageError::EmptyRepository
            } else {
                StorageError::Git(e)
            }
        })?;

        let commit = head.peel_to_commit()?;
        Ok(RevisionId::new(commit.id()))
    }

    /// Resolve a revision string (`HEAD`, `HEAD~2`, a full or abbreviated id)
    /// to a concrete revision.
    pub fn resolve(repo: &Repository, revspec: &str) -> StorageResult<RevisionId> {
        let object = repo
            .revparse_single(revspec)
            .map_err(|_| StorageError::RevisionNotFound(revspec.to_string()))?;

        let commit = object
            .peel_to_commit()
            .map_err(|_| StorageError::RevisionNotFound(revspec.to_string()))?;

        Ok(RevisionId::new(commit.id()))
    }

    /// Walk `depth` first parents back from `from`.
    pub fn nth_ancestor(repo: &Repository, from: RevisionId, depth: usize) -> StorageResult<RevisionId> {
        let mut commit = repo.find_commit(from.raw())?;

        for step in 0..depth {
            commit = match commit.parent(0) {
                Ok(parent) => parent,
                Err(_) => {
                    return Err(StorageError::HistoryTooShort {
                        requested: depth,
                        available: step,
                    })
                }
            };
        }

        Ok(RevisionId::new(commit.id()))
    }

    /// Return the head if it still is `expected`.
    ///
    /// This is the compare half of the compare-and-swap used by resets.
    pub fn ensure_head(repo: &Repository, expected: &str) -> StorageResult<RevisionId> {
        let current = Self::head_commit(repo)?;

        if current.to_string() != expected {
            return Err(StorageError::StaleHead {
                expected: expected.to_string(),
                actual: current,
            });
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tree::create_initial_tree;
    use tempfile::TempDir;

    fn setup_repo_with_history(len: usize) -> (TempDir, Repository, Vec<RevisionId>) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        let ids = {
            let tree_id = create_initial_tree(&repo).unwrap();
            let tree = repo.find_tree(tree_id.raw()).unwrap();
            let sig = git2::Signature::now("Test", "test@test.com").unwrap();

            let mut ids = Vec::new();
            for i in 0..len {
                let parents = match ids.last() {
                    Some(RevisionId(oid)) => vec![repo.find_commit(*oid).unwrap()],
                    None => Vec::new(),
                };
                let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
                let oid = repo
                    .commit(Some("HEAD"), &sig, &sig, &format!("commit {}", i), &tree, &parent_refs)
                    .unwrap();
                ids.push(RevisionId::new(oid));
            }
            ids
        };

        (dir, repo, ids)
    }

    #[test]
    fn test_head_commit() {
        let (_dir, repo, ids) = setup_repo_with_history(2);
        assert_eq!(RefManager::head_commit(&repo).unwrap(), ids[1]);
    }

    #[test]
    fn test_empty_repository() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        assert!(matches!(RefManager::head_commit(&repo), Err(StorageError::EmptyRepository)));
    }

    #[test]
    fn test_resolve() {
        let (_dir, repo, ids) = setup_repo_with_history(3);

        assert_eq!(RefManager::resolve(&repo, "HEAD").unwrap(), ids[2]);
        assert_eq!(RefManager::resolve(&repo, "HEAD~2").unwrap(), ids[0]);
        assert_eq!(RefManager::resolve(&repo, &ids[1].to_string()).unwrap(), ids[1]);
        assert!(matches!(
            RefManager::resolve(&repo, "HEAD~7"),
            Err(StorageError::RevisionNotFound(_))
        ));
    }

    #[test]
    fn test_nth_ancestor() {
        let (_dir, repo, ids) = setup_repo_with_history(3);

        assert_eq!(RefManager::nth_ancestor(&repo, ids[2], 0).unwrap(), ids[2]);
        assert_eq!(RefManager::nth_ancestor(&repo, ids[2], 2).unwrap(), ids[0]);

        let result = RefManager::nth_ancestor(&repo, ids[2], 3);
        assert!(matches!(
            result,
            Err(StorageError::HistoryTooShort { requested: 3, available: 2 })
        ));
    }

    #[test]
    fn test_ensure_head() {
        let (_dir, repo, ids) = setup_repo_with_history(2);

        assert_eq!(RefManager::ensure_head(&repo, &ids[1].to_string()).unwrap(), ids[1]);

        let result = RefManager::ensure_head(&repo, &ids[0].to_string());
        assert!(matches!(result, Err(StorageError::StaleHead { .. })));
    }
}
