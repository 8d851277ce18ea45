use crate::areas::repository::Repository;
use crate::artifacts::objects::object::{Object, ObjectBox};
use std::io::Write;

/// What `cat-file` prints about an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatFileMode {
    /// Pretty-print the content
    Pretty,
    /// Print the object type
    Type,
    /// Print the payload size
    Size,
}

impl Repository {
    pub fn cat_file(&mut self, revision: &str, mode: CatFileMode) -> anyhow::Result<()> {
        let object_id = self.resolve_revision(revision)?;

        match mode {
            CatFileMode::Type => {
                let object = self.database().get(&object_id)?;
                writeln!(self.writer(), "{}", object.object_type)?;
            }
            CatFileMode::Size => {
                let object = self.database().get(&object_id)?;
                writeln!(self.writer(), "{}", object.payload.len())?;
            }
            CatFileMode::Pretty => match self.database().parse_object(&object_id)? {
                // blobs are printed byte for byte
                ObjectBox::Blob(blob) => self.writer().write_all(blob.content())?,
                ObjectBox::Tree(tree) => {
                    let listing = tree.display();
                    if !listing.is_empty() {
                        writeln!(self.writer(), "{listing}")?;
                    }
                }
                other => write!(self.writer(), "{}", other.display())?,
            },
        }

        Ok(())
    }
}
