use crate::areas::repository::Repository;
use crate::areas::workspace::{EntryKind, Workspace};
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::{Tree, TreeEntry};
use anyhow::Context;
use std::path::Path;

impl Repository {
    /// Snapshot a directory into blobs and trees, returning the root tree
    ///
    /// Subtrees are stored before the tree that names them, so every stored tree
    /// only points at objects that already exist. Empty subdirectories cannot be
    /// represented and are left out; an empty root yields the empty tree.
    pub fn write_tree(&self, workspace: &Workspace) -> anyhow::Result<ObjectId> {
        match self.write_subtree(workspace, None)? {
            Some(oid) => Ok(oid),
            None => self.database().store(&Tree::default()),
        }
    }

    fn write_subtree(
        &self,
        workspace: &Workspace,
        dir: Option<&Path>,
    ) -> anyhow::Result<Option<ObjectId>> {
        let mut tree = Tree::default();

        for child in workspace.list_dir(dir)? {
            let name = child
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .with_context(|| format!("Unable to name entry {}", child.display()))?;

            match workspace.stat_entry(&child)? {
                EntryKind::File(file_mode) => {
                    let blob = Blob::new(workspace.read_file(&child)?);
                    let oid = self
                        .database()
                        .store(&blob)
                        .with_context(|| format!("Unable to store {}", child.display()))?;

                    tree.add_entry(TreeEntry::new(name, EntryMode::File(file_mode), oid))?;
                }
                EntryKind::Directory => {
                    if let Some(oid) = self.write_subtree(workspace, Some(&child))? {
                        tree.add_entry(TreeEntry::new(name, EntryMode::Directory, oid))?;
                    }
                }
                EntryKind::Other => {
                    tracing::debug!(path = %child.display(), "skipping special file");
                }
            }
        }

        if tree.is_empty() {
            return Ok(None);
        }

        Ok(Some(self.database().store(&tree)?))
    }
}
