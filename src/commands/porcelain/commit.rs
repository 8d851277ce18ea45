use crate::areas::repository::Repository;
use crate::areas::workspace::Workspace;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::commit::{Commit, Signature};
use crate::artifacts::objects::object_id::ObjectId;
use crate::commands::porcelain::init::DEFAULT_BRANCH;
use anyhow::Context;
use std::io::Write;
use std::path::Path;

impl Repository {
    /// Snapshot `directory` and commit it on top of `branch`
    ///
    /// The tree is written first, then the commit, and the branch moves last, so
    /// a failure at any step leaves refs untouched.
    pub fn commit_tree(
        &mut self,
        directory: Option<&str>,
        author: Option<&str>,
        message: &str,
        branch: Option<&str>,
    ) -> anyhow::Result<ObjectId> {
        let branch_name = match branch {
            Some(branch) => BranchName::try_parse(branch.to_string())?,
            None => match self.refs().current_branch()? {
                Some(branch_name) => branch_name,
                None => BranchName::try_parse(DEFAULT_BRANCH.to_string())?,
            },
        };

        let workspace = match directory {
            Some(directory) => {
                let path = Path::new(directory);
                let path = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.path().join(path)
                };
                if !path.is_dir() {
                    anyhow::bail!("{} is not a directory", path.display());
                }
                Workspace::new(path.into_boxed_path())
            }
            None => Workspace::new(self.path().to_path_buf().into_boxed_path()),
        };

        let tree_oid = self
            .write_tree(&workspace)
            .with_context(|| format!("Unable to snapshot {}", workspace.path().display()))?;

        let signature = Signature::resolve(author)?;
        let parent = self.refs().read_ref(&branch_name)?;
        let is_root = match parent {
            Some(_) => "",
            None => "(root-commit) ",
        };

        let commit = Commit::new(parent, tree_oid, signature, message);
        let commit_id = self.database().store(&commit)?;
        self.refs().update_branch(&branch_name, &commit_id)?;

        tracing::info!(branch = %branch_name, oid = %commit_id, "created commit");
        writeln!(
            self.writer(),
            "[{}{}] {}",
            is_root,
            commit_id.to_short_oid(),
            commit.title()
        )?;

        Ok(commit_id)
    }
}
