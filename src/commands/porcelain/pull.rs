use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::transport::local::LocalTransport;
use crate::artifacts::transport::pkt_line::{read_lines, write_flush, write_line};
use crate::artifacts::transport::{Service, Transport, parse_advertisement};
use bytes::BytesMut;
use std::io::Write;

impl Repository {
    /// Fetch `branch` from the repository at `source` and point the local branch at it
    pub fn pull(&mut self, source: &str, branch: &str) -> anyhow::Result<()> {
        let transport = LocalTransport::new(source);
        self.pull_from(&transport, source, branch)
    }

    pub fn pull_from(
        &mut self,
        transport: &impl Transport,
        source: &str,
        branch: &str,
    ) -> anyhow::Result<()> {
        let branch_name = BranchName::try_parse(branch.to_string())?;
        let ref_name = branch_name.to_sym_ref_name().to_string();

        let advertisement = transport.advertise_refs(Service::UploadPack)?;
        let want = parse_advertisement(&advertisement)?
            .into_iter()
            .find(|remote_ref| remote_ref.name == ref_name)
            .map(|remote_ref| remote_ref.oid)
            .ok_or_else(|| anyhow::anyhow!("couldn't find remote ref {ref_name}"))?;

        if self.refs().read_ref(&branch_name)?.as_ref() == Some(&want) {
            writeln!(self.writer(), "Already up to date.")?;
            return Ok(());
        }

        let mut body = BytesMut::new();
        write_line(&mut body, format!("want {want}\n").as_bytes())?;
        write_flush(&mut body);

        tracing::info!(%source, branch = %branch_name, %want, "fetching");
        let response = transport.request(Service::UploadPack, body.freeze())?;
        let (lines, pack) = read_lines(&response)?;
        if lines.first().map(|line| line.as_ref()) != Some(b"NAK\n".as_slice()) {
            anyhow::bail!("unexpected fetch response from '{source}'");
        }

        let report = self.receive_pack(pack)?;

        match self.database().get(&want) {
            Ok(object) if object.object_type == ObjectType::Commit => {}
            Ok(_) => anyhow::bail!("remote ref {ref_name} does not point at a commit"),
            Err(err) => return Err(err.into()),
        }
        self.refs().update_branch(&branch_name, &want)?;

        writeln!(self.writer(), "From {source}")?;
        writeln!(
            self.writer(),
            " * branch            {branch_name} -> {} ({} objects)",
            want.to_short_oid(),
            report.entries.len()
        )?;

        Ok(())
    }
}
