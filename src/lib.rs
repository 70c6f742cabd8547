//! EDB - an engineering data base over Git
//!
//! Generic contents (UUID-identified property bags) are stored as files in a
//! Git working tree. Every commit of the handler is one revision, and a field
//! index kept in a second repository answers boolean queries over the
//! committed state.
//!
//! # Example
//!
//! ```no_run
//! use edb::content::GenericContent;
//! use edb::edb::{EdbConfig, EdbHandler};
//!
//! let handler = EdbHandler::open(EdbConfig::new("./my_edb")).unwrap();
//! let mut part = GenericContent::new(handler.repository_base(), &["project", "part"], &["apollo", "valve"]);
//! part.set_property("material", "steel");
//!
//! handler.add(std::slice::from_mut(&mut part)).unwrap();
//! let head = handler.commit("jdoe", "jdoe@example.com").unwrap();
//!
//! let hits = handler.query("material:steel AND project:apollo", false).unwrap();
//! assert_eq!(hits.len(), 1);
//! # let _ = head;
//! ```

pub mod content;
pub mod edb;
pub mod search;
pub mod storage;
