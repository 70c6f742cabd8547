//! Blob operations for content storage.
//!
//! Content files are written to the working tree by
//! [`GenericContent::store`](crate::content::GenericContent::store); this
//! module moves their bytes in and out of the object database.

use std::path::Path;

use git2::Repository;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::BlobId;

/// write raw bytes as a blob, returning its ID (SHA-1 of the content)
pub fn write_blob(repo: &Repository, bytes: &[u8]) -> StorageResult<BlobId> {
    let oid = repo.blob(bytes)?;
    Ok(BlobId::new(oid))
}

/// write a working tree file as a blob
///
/// a missing file surfaces as an I/O error rather than a git error so callers
/// can tell "not stored yet" apart from object database failures
pub fn write_blob_from_file(repo: &Repository, file: &Path) -> StorageResult<BlobId> {
    let bytes = std::fs::read(file)?;
    write_blob(repo, &bytes)
}

/// read a blob's content from the repository
pub fn read_blob(repo: &Repository, blob_id: BlobId) -> StorageResult<Vec<u8>> {
    let blob = repo
        .find_blob(blob_id.raw())
        .map_err(|_| StorageError::Internal(format!("dangling blob {}", blob_id)))?;
    Ok(blob.content().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_blob_roundtrip() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        let id = write_blob(&repo, b"{\"uuid\":\"x\"}").unwrap();
        assert_eq!(read_blob(&repo, id).unwrap(), b"{\"uuid\":\"x\"}");
    }

    #[test]
    fn test_identical_content_same_blob() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        let file = dir.path().join("content");
        std::fs::write(&file, b"same").unwrap();

        let a = write_blob_from_file(&repo, &file).unwrap();
        let b = write_blob(&repo, b"same").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        let result = write_blob_from_file(&repo, &dir.path().join("missing"));
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
