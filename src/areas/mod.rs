//! Core repository components
//!
//! - `database`: Loose object store for blobs, trees, commits and tags
//! - `refs`: Reference management (branches, HEAD)
//! - `repository`: Ties the areas together for command implementations
//! - `workspace`: Directory walking and file reads for snapshots

pub mod database;
pub mod refs;
pub mod repository;
pub mod workspace;
