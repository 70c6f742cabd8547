//! Generic content, the record type persisted by the EDB.
//!
//! A [`GenericContent`] is a UUID-identified bag of string properties that
//! knows where it lives inside a repository working tree:
//!
//! ```text
//! <repository base>/<segment 0>/.../<segment n>/<uuid>
//! ```
//!
//! The file holds a pretty-printed JSON document (see [`codec`]) and is only
//! durable once the handler commits it.

pub mod codec;
mod error;
mod generic;

pub use error::{ContentError, ContentResult};
pub use generic::{validate_segment, GenericContent, HEAD_KEY, NAME_KEY, PATH_KEY, UUID_KEY};
