//! The EDB handler: staged changes, atomic commits, queries and resets over
//! a data repository and its versioned index.
//!
//! ```text
//! <root>/
//!   data/    git working tree, one JSON file per content
//!   index/   git working tree holding documents.json
//! ```

mod config;
mod error;
mod handler;
mod pending;

pub use config::{EdbConfig, DATA_DIR, INDEX_DIR};
pub use error::{EdbError, EdbResult};
pub use handler::{EdbHandler, EdbHandlerBuilder, Phase};
pub use pending::PendingOp;
