use crate::areas::repository::Repository;
use crate::artifacts::objects::object_id::ObjectId;
use std::io::Write;
use std::path::Path;

impl Repository {
    pub fn ls_tree(&mut self, revision: &str, recursive: bool) -> anyhow::Result<()> {
        let oid = self.resolve_revision(revision)?;

        match self.database().parse_object_as_commit(&oid)? {
            Some(commit) => self.print_tree(commit.tree_oid(), None, recursive),
            None => self.print_tree(&oid, None, recursive),
        }
    }

    fn print_tree(
        &self,
        oid: &ObjectId,
        prefix: Option<&Path>,
        recursive: bool,
    ) -> anyhow::Result<()> {
        let tree = self
            .database()
            .parse_object_as_tree(oid)?
            .ok_or_else(|| anyhow::anyhow!("not a tree object: {oid}"))?;

        for entry in tree.into_entries() {
            let path = match prefix {
                Some(prefix) => prefix.join(&entry.name),
                None => Path::new(&entry.name).to_path_buf(),
            };

            if entry.is_tree() && recursive {
                self.print_tree(&entry.oid, Some(&path), recursive)?;
                continue;
            }

            writeln!(
                self.writer(),
                "{:0>6} {} {}\t{}",
                entry.mode.as_str(),
                entry.mode.object_type(),
                entry.oid,
                path.display()
            )?;
        }

        Ok(())
    }
}
