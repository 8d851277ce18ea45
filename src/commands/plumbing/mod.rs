//! Plumbing commands (low-level object operations)
//!
//! Plumbing commands provide direct access to the object database and pack
//! archives. They're primarily used for scripting and as building blocks
//! for porcelain commands.
//!
//! ## Commands
//!
//! - `hash-object`: Compute object ID and optionally store in database
//! - `cat-file`: Print an object's content, type or size
//! - `ls-tree`: List contents of a tree object
//! - `pack-objects`: Bundle stored objects into a pack archive
//! - `unpack-objects`: Store every object of a pack archive

pub mod cat_file;
pub mod hash_object;
pub mod ls_tree;
pub mod pack_objects;
pub mod unpack_objects;
pub mod write_tree;
