//! References (branches and HEAD)
//!
//! References are the only mutable entities in the store: human-readable names
//! pointing to commits.
//! - Direct: containing a commit SHA-1
//! - Symbolic: pointing to another reference (e.g., HEAD -> refs/heads/master)
//!
//! ## File Format
//!
//! References are stored as text files containing either:
//! - A 40-character SHA-1 hash followed by a newline (direct reference)
//! - `ref: <path>` for symbolic references
//!
//! HEAD is resolved through at most one symbolic hop. Updating a branch is the
//! last step of every commit sequence, so a ref never points at an object
//! that was not written first.

use crate::artifacts::branch::branch_name::{BranchName, REF_PREFIX, SymRefName};
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use derive_new::new;
use file_guard::Lock;
use std::io::Write;
use std::ops::DerefMut;
use std::path::Path;
use walkdir::WalkDir;

/// References manager
///
/// Reads and writes HEAD and branch files under the git directory.
/// Writers take an exclusive lock on the file being rewritten; callers
/// serialize competing updates of the same branch.
#[derive(Debug, new)]
pub struct Refs {
    /// Path to the git directory (typically `.git`)
    path: Box<Path>,
}

/// Regex pattern for parsing symbolic references
const SYMREF_REGEX: &str = r"^ref: (.+)$";

/// Name of the HEAD reference
pub const HEAD_REF_NAME: &str = "HEAD";

/// Content of a reference file
#[derive(Debug, Clone)]
enum SymRefOrOid {
    SymRef { sym_ref_name: SymRefName },
    Oid(ObjectId),
}

impl SymRefOrOid {
    fn read_symref_or_oid(path: &Path) -> anyhow::Result<Option<SymRefOrOid>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ref file at {:?}", path))?;
        let content = content.trim();

        if content.is_empty() {
            return Ok(None);
        }

        let symref_match = regex::Regex::new(SYMREF_REGEX)?.captures(content);
        if let Some(symref_match) = symref_match {
            Ok(Some(SymRefOrOid::SymRef {
                sym_ref_name: SymRefName::new(symref_match[1].to_string()),
            }))
        } else {
            Ok(Some(SymRefOrOid::Oid(
                ObjectId::try_parse(content.to_string())
                    .with_context(|| format!("invalid ref file at {:?}", path))?,
            )))
        }
    }
}

impl Refs {
    /// Resolve HEAD to a commit ID
    ///
    /// Returns `None` for a fresh store where the current branch has no commit yet.
    pub fn read_head(&self) -> anyhow::Result<Option<ObjectId>> {
        match SymRefOrOid::read_symref_or_oid(&self.head_path())? {
            Some(SymRefOrOid::Oid(oid)) => Ok(Some(oid)),
            Some(SymRefOrOid::SymRef { sym_ref_name }) => {
                let target = self.path.join(sym_ref_name.as_ref_path());

                match SymRefOrOid::read_symref_or_oid(&target)? {
                    Some(SymRefOrOid::Oid(oid)) => Ok(Some(oid)),
                    Some(SymRefOrOid::SymRef { .. }) => anyhow::bail!(
                        "HEAD points at {} which is itself symbolic",
                        sym_ref_name
                    ),
                    None => Ok(None),
                }
            }
            None => Ok(None),
        }
    }

    /// The reference HEAD points at, or HEAD itself when detached
    pub fn current_ref(&self) -> anyhow::Result<SymRefName> {
        match SymRefOrOid::read_symref_or_oid(&self.head_path())? {
            Some(SymRefOrOid::SymRef { sym_ref_name }) => Ok(sym_ref_name),
            Some(SymRefOrOid::Oid(_)) | None => Ok(SymRefName::new(HEAD_REF_NAME.to_string())),
        }
    }

    /// The branch HEAD points at, if HEAD is symbolic
    pub fn current_branch(&self) -> anyhow::Result<Option<BranchName>> {
        let current_ref = self.current_ref()?;

        if current_ref.is_detached_head() {
            Ok(None)
        } else {
            Ok(Some(BranchName::try_parse_sym_ref_name(&current_ref)?))
        }
    }

    pub fn read_ref(&self, branch_name: &BranchName) -> anyhow::Result<Option<ObjectId>> {
        let ref_path = self.heads_path().join(branch_name.as_ref());

        match SymRefOrOid::read_symref_or_oid(&ref_path)? {
            Some(SymRefOrOid::Oid(oid)) => Ok(Some(oid)),
            Some(SymRefOrOid::SymRef { .. }) => {
                anyhow::bail!("branch {} is a symbolic reference", branch_name)
            }
            None => Ok(None),
        }
    }

    /// Point a branch at a commit and make it the current branch
    pub fn update_branch(&self, branch_name: &BranchName, oid: &ObjectId) -> anyhow::Result<()> {
        self.update_ref(branch_name, oid)?;
        self.set_head(branch_name)
    }

    /// Point a branch at a commit without touching HEAD
    pub fn update_ref(&self, branch_name: &BranchName, oid: &ObjectId) -> anyhow::Result<()> {
        let ref_path = self.heads_path().join(branch_name.as_ref());

        self.update_ref_file(&ref_path, format!("{oid}\n"))?;
        tracing::debug!(branch = %branch_name, oid = %oid, "updated branch");

        Ok(())
    }

    pub fn set_head(&self, branch_name: &BranchName) -> anyhow::Result<()> {
        self.update_ref_file(
            &self.head_path(),
            format!("ref: {}\n", branch_name.to_sym_ref_name()),
        )
    }

    pub fn set_detached_head(&self, oid: &ObjectId) -> anyhow::Result<()> {
        self.update_ref_file(&self.head_path(), format!("{oid}\n"))
    }

    fn update_ref_file(&self, path: &Path, raw_ref: String) -> anyhow::Result<()> {
        // create all the parent directories if they don't exist
        std::fs::create_dir_all(path.parent().with_context(|| {
            format!(
                "failed to create parent directories for ref file at {:?}",
                path
            )
        })?)?;

        let mut ref_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to open ref file at {:?}", path))?;
        let mut lock = file_guard::lock(&mut ref_file, Lock::Exclusive, 0, 1)
            .with_context(|| format!("failed to lock ref file at {:?}", path))?;
        lock.deref_mut()
            .write_all(raw_ref.as_bytes())
            .with_context(|| format!("failed to write ref file at {:?}", path))?;

        Ok(())
    }

    /// All branches that currently point at a commit, sorted by name
    pub fn list_branches(&self) -> anyhow::Result<Vec<(BranchName, ObjectId)>> {
        let heads_path = self.heads_path();
        if !heads_path.exists() {
            return Ok(Vec::new());
        }

        let mut branches = Vec::new();
        for entry in WalkDir::new(&heads_path) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative_path = entry.path().strip_prefix(self.path.as_ref())?;
            let sym_ref_name = SymRefName::new(relative_path.to_string_lossy().replace('\\', "/"));
            let branch_name = BranchName::try_parse_sym_ref_name(&sym_ref_name)?;

            if let Some(oid) = self.read_ref(&branch_name)? {
                branches.push((branch_name, oid));
            }
        }

        branches.sort();
        Ok(branches)
    }

    pub fn head_path(&self) -> Box<Path> {
        self.path.join(HEAD_REF_NAME).into_boxed_path()
    }

    pub fn refs_path(&self) -> Box<Path> {
        self.path.join("refs").into_boxed_path()
    }

    pub fn heads_path(&self) -> Box<Path> {
        self.path
            .join(REF_PREFIX.trim_end_matches('/'))
            .into_boxed_path()
    }
}
