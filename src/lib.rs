//! # TuskDB - Single-File Typed Object Store
//!
//! TuskDB keeps user-defined schemas ("classes") and their instances
//! ("nodes") in one backing file, on top of a hand-managed paged heap. It
//! is a library, not a server: one handle, one thread, write-through
//! persistence.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tuskdb::{Class, Database, Node, OpenMode, PrimitiveKind, Value};
//!
//! let mut db = Database::open("./people.tusk", OpenMode::Default)?;
//!
//! let person = Arc::new(Class::structure(
//!     "person",
//!     vec![
//!         Class::string("name")?,
//!         Class::primitive(PrimitiveKind::Int, "age")?,
//!     ],
//! )?);
//!
//! db.add_class(&person)?;
//! db.add_node(&Node::new(
//!     Arc::clone(&person),
//!     Value::Struct(vec!["Greg".into(), 19.into()]),
//! )?)?;
//!
//! for node in db.collect_nodes(&person)? {
//!     println!("{}", node);
//! }
//! ```
//!
//! ## File Layout
//!
//! ```text
//! +--------------------------------------+
//! |  magic | superblock                  |
//! |   free-list sentinel  + count        |
//! |   pagetable origin, pages count      |
//! |   class-list sentinel + count        |
//! +--------------------------------------+
//! |  page 0 | page 1 | ...   (4KB each)  |
//! +--------------------------------------+
//! ```
//!
//! Pages are threaded onto intrusive doubly-linked rings: freed pages on
//! the free-list (recycled LIFO), one page per registered class on the
//! class-list, and each class's stored nodes on that class's own
//! node-list.
//!
//! ## Module Overview
//!
//! - [`storage`]: flat file, page headers, superblock, allocator, lists
//! - [`types`]: schema classes, canonical strings, typed values
//! - [`database`]: the top-level handle
//! - [`error`]: the typed error taxonomy
//!
//! ## Logging
//!
//! The crate emits `tracing` events (`debug`/`info`/`error`) at structural
//! decision points; without a subscriber installed they cost nothing.

pub mod database;
pub mod error;
pub mod storage;
pub mod types;

pub use database::{Database, OpenMode, PrintMode};
pub use error::DbError;
pub use storage::{DbFile, PAGE_SIZE};
pub use types::{Class, ClassDescriptor, Node, PrimitiveKind, Value};
