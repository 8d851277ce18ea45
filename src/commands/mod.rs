//! Command-line operations, implemented as methods on `Repository`
//!
//! - `plumbing`: object-level commands (hash-object, cat-file, ls-tree,
//!   pack-objects, unpack-objects)
//! - `porcelain`: repository workflows (init, commit-tree, push, pull)

pub mod plumbing;
pub mod porcelain;
