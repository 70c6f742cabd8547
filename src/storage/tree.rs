//! tree operations for the content hierarchy.
//!
//! in Git, a tree is a directory. In the EDB:
//! - every path segment of a generic content is a directory
//! - every content is a blob named after its uuid
//!
//! this module provides read access to those trees and a small wrapper
//! around `git2::build::TreeUpdateBuilder` for producing new ones.

use std::path::PathBuf;

use git2::build::TreeUpdateBuilder;
use git2::{FileMode, ObjectType, Repository, Tree, TreeWalkMode, TreeWalkResult};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BlobId, TreeId};

/// A read only handle to a git tree at a specific revision
///
/// think of it as a snapshot - it won't change even if new commits are made.
pub struct TreeHandle<'repo> {
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    /// create a TreeHandle from a git2::Tree
    pub(crate) fn new(tree: Tree<'repo>) -> Self {
        Self { tree }
    }

    /// get the tree ID
    pub fn id(&self) -> TreeId {
        TreeId::new(self.tree.id())
    }

    /// get the underlying git2::Tree (for internal use)
    pub(crate) fn inner(&self) -> &Tree<'repo> {
        &self.tree
    }

    /// get the blob ID stored at a `/`-separated path
    pub fn blob_at(&self, path: &str) -> StorageResult<Option<BlobId>> {
        let entry = match self.tree.get_path(std::path::Path::new(path)) {
            Ok(entry) => entry,
            Err(_) => return Ok(None),
        };

        if entry.kind() != Some(ObjectType::Blob) {
            return Err(StorageError::UnexpectedEntryType {
                path: PathBuf::from(path),
                expected: "blob (file)".to_string(),
                found: format!("{:?}", entry.kind()),
            });
        }

        Ok(Some(BlobId::new(entry.id())))
    }

    /// check if a file exists at a path
    pub fn contains(&self, path: &str) -> bool {
        matches!(self.blob_at(path), Ok(Some(_)))
    }

    /// every file of the tree as (`/`-separated path, blob) pairs
    pub fn files(&self) -> StorageResult<Vec<(String, BlobId)>> {
        let mut files = Vec::new();

        self.tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    files.push((format!("{}{}", root, name), BlobId::new(entry.id())));
                }
            }
            TreeWalkResult::Ok
        })?;

        Ok(files)
    }

    /// names of the directories below `segments`
    ///
    /// segments are matched case-insensitively; a path that does not exist
    /// yields an empty list
    pub fn child_directories(&self, repo: &'repo Repository, segments: &[&str]) -> StorageResult<Vec<String>> {
        let mut current = self.tree.clone();

        for segment in segments {
            let next = current
                .iter()
                .filter(|entry| entry.kind() == Some(ObjectType::Tree))
                .find(|entry| {
                    entry
                        .name()
                        .map(|name| name.eq_ignore_ascii_case(segment))
                        .unwrap_or(false)
                })
                .map(|entry| entry.id());

            current = match next {
                Some(id) => repo.find_tree(id)?,
                None => return Ok(Vec::new()),
            };
        }

        let names = current
            .iter()
            .filter(|entry| entry.kind() == Some(ObjectType::Tree))
            .filter_map(|entry| entry.name().map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .collect();

        Ok(names)
    }
}

/// A batch of file updates applied on top of a baseline tree.
///
/// # Usage Pattern
///
/// ```ignore
/// let mut update = TreeUpdate::new();
/// update.upsert("customer/acme/4f0c…", blob_id);
/// update.remove("customer/old/77ab…");
/// let new_tree_id = update.write(repo, &baseline)?;
/// ```
pub struct TreeUpdate {
    builder: TreeUpdateBuilder,
    len: usize,
}

impl TreeUpdate {
    pub fn new() -> Self {
        Self {
            builder: TreeUpdateBuilder::new(),
            len: 0,
        }
    }

    /// insert or replace a file
    pub fn upsert(&mut self, path: &str, blob: BlobId) {
        self.builder.upsert(path, blob.raw(), FileMode::Blob);
        self.len += 1;
    }

    /// remove a file; the caller checks that it exists in the baseline
    pub fn remove(&mut self, path: &str) {
        self.builder.remove(path);
        self.len += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// write the updated tree and return its ID
    pub fn write(mut self, repo: &Repository, baseline: &TreeHandle<'_>) -> StorageResult<TreeId> {
        let oid = self.builder.create_updated(repo, baseline.inner())?;
        Ok(TreeId::new(oid))
    }
}

impl Default for TreeUpdate {
    fn default() -> Self {
        Self::new()
    }
}

/// create the empty root tree of a new repository
pub fn create_initial_tree(repo: &Repository) -> StorageResult<TreeId> {
    let builder = repo.treebuilder(None)?;
    let oid = builder.write()?;
    Ok(TreeId::new(oid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::blob::write_blob;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn empty_handle(repo: &Repository) -> TreeHandle<'_> {
        let tree_id = create_initial_tree(repo).unwrap();
        TreeHandle::new(repo.find_tree(tree_id.raw()).unwrap())
    }

    #[test]
    fn test_upsert_nested_and_list_files() {
        let (_dir, repo) = setup_repo();
        let baseline = empty_handle(&repo);
        let blob = write_blob(&repo, b"content").unwrap();

        let mut update = TreeUpdate::new();
        update.upsert("a/b/one", blob);
        update.upsert("a/two", blob);
        update.upsert("three", blob);
        let tree_id = update.write(&repo, &baseline).unwrap();

        let handle = TreeHandle::new(repo.find_tree(tree_id.raw()).unwrap());
        let mut paths: Vec<String> = handle.files().unwrap().into_iter().map(|(p, _)| p).collect();
        paths.sort();
        assert_eq!(paths, ["a/b/one", "a/two", "three"]);

        assert!(handle.contains("a/b/one"));
        assert!(!handle.contains("a/b/missing"));
        assert_eq!(handle.blob_at("a/two").unwrap(), Some(blob));
    }

    #[test]
    fn test_remove_file() {
        let (_dir, repo) = setup_repo();
        let baseline = empty_handle(&repo);
        let blob = write_blob(&repo, b"content").unwrap();

        let mut update = TreeUpdate::new();
        update.upsert("a/one", blob);
        update.upsert("a/two", blob);
        let tree_id = update.write(&repo, &baseline).unwrap();
        let handle = TreeHandle::new(repo.find_tree(tree_id.raw()).unwrap());

        let mut update = TreeUpdate::new();
        update.remove("a/one");
        let tree_id = update.write(&repo, &handle).unwrap();
        let handle = TreeHandle::new(repo.find_tree(tree_id.raw()).unwrap());

        assert!(!handle.contains("a/one"));
        assert!(handle.contains("a/two"));
    }

    #[test]
    fn test_directory_entry_is_not_a_blob() {
        let (_dir, repo) = setup_repo();
        let baseline = empty_handle(&repo);
        let blob = write_blob(&repo, b"content").unwrap();

        let mut update = TreeUpdate::new();
        update.upsert("dir/file", blob);
        let tree_id = update.write(&repo, &baseline).unwrap();
        let handle = TreeHandle::new(repo.find_tree(tree_id.raw()).unwrap());

        assert!(matches!(handle.blob_at("dir"), Err(StorageError::UnexpectedEntryType { .. })));
    }

    #[test]
    fn test_child_directories() {
        let (_dir, repo) = setup_repo();
        let baseline = empty_handle(&repo);
        let blob = write_blob(&repo, b"content").unwrap();

        let mut update = TreeUpdate::new();
        update.upsert("a/b/c/f1", blob);
        update.upsert("a/b1/c1/f2", blob);
        update.upsert("top/f3", blob);
        update.upsert("loose", blob);
        let tree_id = update.write(&repo, &baseline).unwrap();
        let handle = TreeHandle::new(repo.find_tree(tree_id.raw()).unwrap());

        let mut root = handle.child_directories(&repo, &[]).unwrap();
        root.sort();
        assert_eq!(root, ["a", "top"]);

        let mut below_a = handle.child_directories(&repo, &["A"]).unwrap();
        below_a.sort();
        assert_eq!(below_a, ["b", "b1"]);

        assert_eq!(handle.child_directories(&repo, &["a", "b"]).unwrap(), ["c"]);
        assert!(handle.child_directories(&repo, &["nope"]).unwrap().is_empty());
    }
}
