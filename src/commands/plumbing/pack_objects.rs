use crate::areas::repository::Repository;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::pack::writer::PackWriter;
use anyhow::Context;
use bytes::Bytes;
use std::io::Write;

impl Repository {
    /// Bundle objects into an archive; with no identities every stored object goes in
    pub fn build_pack(&self, object_ids: &[ObjectId]) -> anyhow::Result<Bytes> {
        if object_ids.is_empty() {
            return PackWriter::build(self.database(), &self.all_objects()?);
        }

        PackWriter::build(self.database(), object_ids)
    }

    fn all_objects(&self) -> anyhow::Result<Vec<ObjectId>> {
        self.database()
            .list_objects()
            .context("Unable to scan the object database")
    }

    pub fn pack_objects(&mut self, output: &str, revisions: &[String]) -> anyhow::Result<()> {
        let mut object_ids = revisions
            .iter()
            .map(|revision| self.resolve_revision(revision))
            .collect::<anyhow::Result<Vec<_>>>()?;
        if object_ids.is_empty() {
            object_ids = self.all_objects()?;
        }

        let pack = self.build_pack(&object_ids)?;
        std::fs::write(output, &pack).with_context(|| format!("Unable to write {output}"))?;

        writeln!(
            self.writer(),
            "Packed {} objects into {output}",
            object_ids.len()
        )?;

        Ok(())
    }
}
