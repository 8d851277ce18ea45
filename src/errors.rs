//! Error taxonomy of the object store and the pack codec
//!
//! The store and pack layers return precise error kinds so callers can tell a
//! missing object from a corrupt one. Command-level code wraps these into
//! `anyhow` errors with context, the same way the rest of the crate reports
//! failures.

use crate::artifacts::objects::object_id::ObjectId;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("corrupt object {oid}: {reason}")]
    CorruptObject { oid: ObjectId, reason: String },

    #[error("corrupt archive at offset {offset}: {reason}")]
    CorruptArchive { offset: u64, reason: String },

    #[error("missing delta base {base} for entry at offset {offset}")]
    MissingDeltaBase { offset: u64, base: DeltaBase },

    #[error("i/o failure at {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How a delta entry names its base object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaBase {
    /// Absolute archive offset of an earlier entry
    Offset(u64),
    /// Content identity of an object inside or outside the archive
    Oid(ObjectId),
}

impl std::fmt::Display for DeltaBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeltaBase::Offset(offset) => write!(f, "at offset {offset}"),
            DeltaBase::Oid(oid) => write!(f, "{oid}"),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn corrupt_archive(offset: u64, reason: impl Into<String>) -> Self {
        StoreError::CorruptArchive {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt_object(oid: &ObjectId, reason: impl Into<String>) -> Self {
        StoreError::CorruptObject {
            oid: oid.clone(),
            reason: reason.into(),
        }
    }
}

/// Attach the offending path to an i/o error
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> StoreResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> StoreResult<T> {
        self.map_err(|source| StoreError::IoFailure {
            path: path.into(),
            source,
        })
    }
}
