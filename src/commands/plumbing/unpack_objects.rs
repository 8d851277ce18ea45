use crate::areas::repository::Repository;
use crate::artifacts::pack::reader::{PackReader, UnpackReport};
use anyhow::Context;
use std::io::Write;

impl Repository {
    /// Decode an archive into this repository's object database
    pub fn receive_pack(&self, pack: &[u8]) -> anyhow::Result<UnpackReport> {
        let report = PackReader::new(self.database())
            .unpack(pack)
            .context("Unable to unpack archive")?;

        if let Some(failure) = report.failures.first() {
            anyhow::bail!(
                "{} of {} entries could not be resolved: {failure}",
                report.failures.len(),
                report.failures.len() + report.entries.len()
            );
        }

        Ok(report)
    }

    pub fn unpack_objects(&mut self, input: &str) -> anyhow::Result<()> {
        let pack = std::fs::read(input).with_context(|| format!("Unable to read {input}"))?;
        let report = self.receive_pack(&pack)?;

        for entry in &report.entries {
            writeln!(self.writer(), "{} {}", entry.object_type, entry.oid)?;
        }

        Ok(())
    }
}
