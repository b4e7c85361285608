//! # Stagesync Testkit
//!
//! Test utilities for stagesync.
//!
//! This crate provides:
//! - A sample schema (sites, users, roles, tag groups, tags, categories)
//! - [`TestHost`], a host whose in-memory collaborators stay inspectable
//! - Change-set builders for object and document tasks
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stagesync_testkit::prelude::*;
//!
//! #[test]
//! fn applies_tag_group() {
//!     let test = TestHost::new();
//!     let source = TagGroupSource::new(7, "colors").tag("red");
//!     test.service().process_task(&source.task()).unwrap();
//!     assert_eq!(test.rows(types::TAG).len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod builders;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builders::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use builders::*;
pub use fixtures::*;
pub use generators::*;
