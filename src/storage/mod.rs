//! Git storage for the EDB.
//!
//! Content files live in the working tree of a non-bare repository; a revision
//! is one commit on `HEAD`. The handler goes through this API only and never
//! touches git2 directly.
//!
//! # Layout
//!
//! ```text
//!   GitRepository ── prepare_commit() ──> Commit  (stage, author, commit)
//!        │        └─ prepare_reset()  ──> Reset   (depth, mode, head guard)
//!        │
//!        ├── refs    HEAD resolution, ancestors, head guard
//!        ├── tree    tree lookups and path updates
//!        ├── blob    content bytes
//!        └── commit  revision objects, history, diffs
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use edb::content::GenericContent;
//! use edb::storage::{GitRepository, GitSignature};
//!
//! let repo = GitRepository::open_or_init("./data", GitSignature::edb())?;
//!
//! let mut content = GenericContent::new(repo.path(), &["customer"], &["acme"]);
//! content.ensure_uuid();
//! content.store()?;
//!
//! let rev = repo
//!     .prepare_commit()
//!     .add(&content)
//!     .set_author("alice", "alice@x.org")
//!     .set_message("add acme")
//!     .commit()?;
//! ```

mod blob;
mod commit;
mod error;
mod refs;
mod repository;
mod session;
mod tree;
mod types;

pub use commit::{CommitInfo, CommitMessage};
pub use error::{StorageError, StorageResult};
pub use repository::{GitRepository, GitRepositoryFactory, RepositoryFactory};
pub use session::{Commit, Reset};
pub use types::{BlobId, Change, ChangeStatus, GitSignature, ResetMode, RevisionId, TreeId};
