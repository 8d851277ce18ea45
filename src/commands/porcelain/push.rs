use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::local::LocalTransport;
use crate::artifacts::transport::pkt_line::{write_flush, write_line};
use crate::artifacts::transport::{Service, Transport, parse_advertisement, parse_report};
use bytes::{BufMut, BytesMut};
use std::io::Write;

impl Repository {
    /// Send `branch` and every stored object to the repository at `destination`
    pub fn push(&mut self, destination: &str, branch: &str) -> anyhow::Result<()> {
        let transport = LocalTransport::new(destination);
        self.push_to(&transport, destination, branch)
    }

    pub fn push_to(
        &mut self,
        transport: &impl Transport,
        destination: &str,
        branch: &str,
    ) -> anyhow::Result<()> {
        let branch_name = BranchName::try_parse(branch.to_string())?;
        let ref_name = branch_name.to_sym_ref_name();
        let new = self
            .refs()
            .read_ref(&branch_name)?
            .ok_or_else(|| anyhow::anyhow!("src refspec {branch} does not match any"))?;

        let advertisement = transport.advertise_refs(Service::ReceivePack)?;
        let old = parse_advertisement(&advertisement)?
            .into_iter()
            .find(|remote_ref| remote_ref.name == ref_name.to_string())
            .map(|remote_ref| remote_ref.oid)
            .unwrap_or_else(ObjectId::null);

        if old == new {
            writeln!(self.writer(), "Everything up-to-date")?;
            return Ok(());
        }
        if !old.is_null() {
            if !self.database().contains(&old) {
                anyhow::bail!(
                    "failed to push some refs to '{destination}': {branch_name} (fetch first)"
                );
            }
            if !self.is_ancestor(&old, &new)? {
                anyhow::bail!(
                    "failed to push some refs to '{destination}': {branch_name} (non-fast-forward)"
                );
            }
        }

        let pack = self.build_pack(&[])?;
        let mut body = BytesMut::with_capacity(pack.len() + 128);
        write_line(
            &mut body,
            format!("{old} {new} {ref_name}\0report-status\n").as_bytes(),
        )?;
        write_flush(&mut body);
        body.put_slice(&pack);

        tracing::info!(%destination, branch = %branch_name, size = pack.len(), "pushing");
        let response = transport.request(Service::ReceivePack, body.freeze())?;
        let (unpack, results) = parse_report(&response)?;

        if unpack != "ok" {
            anyhow::bail!("remote unpack failed: {unpack}");
        }
        for result in &results {
            if let Some(reason) = result.strip_prefix("ng ") {
                anyhow::bail!("failed to push some refs to '{destination}': {reason}");
            }
        }

        let range = if old.is_null() {
            " * [new branch]     ".to_string()
        } else {
            format!("   {}..{}  ", old.to_short_oid(), new.to_short_oid())
        };
        writeln!(self.writer(), "To {destination}")?;
        writeln!(self.writer(), "{range}{branch_name} -> {branch_name}")?;

        Ok(())
    }

    /// Whether `ancestor` is reachable from `commit` through first parents
    fn is_ancestor(&self, ancestor: &ObjectId, commit: &ObjectId) -> anyhow::Result<bool> {
        let mut next = Some(commit.clone());

        while let Some(oid) = next {
            if &oid == ancestor {
                return Ok(true);
            }
            next = self
                .database()
                .parse_object_as_commit(&oid)?
                .and_then(|commit| commit.parent().cloned());
        }

        Ok(false)
    }
}
