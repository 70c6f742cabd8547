//! core type-safe wrappers around git primitives for the storage layer.

use std::fmt;
use std::path::PathBuf;

use git2::Oid;
use serde::{Deserialize, Serialize};

/// Identifier of a committed revision.
///
/// This makes sure we don't accidentally pass a blob ID where a revision is
/// expected. The inner Oid is only accessible within the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RevisionId(pub(crate) Oid);

impl RevisionId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse a RevisionId from a full hex string
    pub fn from_hex(hex: &str) -> Result<Self, git2::Error> {
        Oid::from_str(hex).map(RevisionId)
    }

    /// short form of the revision ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git blob identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub(crate) Oid);

impl BlobId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git tree identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) Oid);

impl TreeId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// git signature (author/committer info)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSignature {
    pub name: String,
    pub email: String,
}

impl GitSignature {
    /// create a new signature
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// default committer for EDB revisions
    pub fn edb() -> Self {
        Self::new("EDB", "edb@localhost")
    }

    /// convert to git2::Signature
    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for GitSignature {
    fn default() -> Self {
        Self::edb()
    }
}

/// how far a reset reaches into the index and working tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetMode {
    /// move the head only
    Soft,
    /// move the head and the git index
    Mixed,
    /// move everything, working tree included
    #[default]
    Hard,
}

impl ResetMode {
    pub(crate) fn to_git2(self) -> git2::ResetType {
        match self {
            ResetMode::Soft => git2::ResetType::Soft,
            ResetMode::Mixed => git2::ResetType::Mixed,
            ResetMode::Hard => git2::ResetType::Hard,
        }
    }
}

/// represents a change in a diff between revisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub status: ChangeStatus,
}

/// the type of change in a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_id_hex() {
        let hex = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";
        let id = RevisionId::from_hex(hex).unwrap();
        assert_eq!(id.to_string(), hex);
        assert_eq!(id.short(), "4b825dc");
        assert!(RevisionId::from_hex("not hex").is_err());
    }

    #[test]
    fn test_default_signature() {
        let sig = GitSignature::default();
        assert_eq!(sig, GitSignature::new("EDB", "edb@localhost"));
    }

    #[test]
    fn test_reset_mode_default_is_hard() {
        assert_eq!(ResetMode::default(), ResetMode::Hard);
        assert!(matches!(ResetMode::Mixed.to_git2(), git2::ResetType::Mixed));
    }
}
