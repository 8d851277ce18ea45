//! Porcelain commands (user-facing operations)
//!
//! Porcelain commands compose plumbing commands and internal operations into
//! workflows that match typical Git usage patterns.
//!
//! ## Commands
//!
//! - `init`: Initialize a new repository
//! - `commit-tree`: Snapshot a directory and commit it on a branch
//! - `push`: Send a branch and its objects to another repository
//! - `pull`: Receive a branch and its objects from another repository

pub mod commit;
pub mod init;
pub mod pull;
pub mod push;
