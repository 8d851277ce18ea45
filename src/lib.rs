//! A content-addressable object store with pack archives
//!
//! - `areas`: the object database, references and the directory being snapshotted
//! - `artifacts`: object formats, pack archives and the transport boundary
//! - `commands`: repository operations behind the command line
//! - `errors`: error kinds of the store and pack layers

pub mod areas;
pub mod artifacts;
pub mod commands;
pub mod errors;
