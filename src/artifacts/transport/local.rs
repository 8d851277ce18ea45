use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, REF_PREFIX};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::reader::PackReader;
use crate::artifacts::pack::writer::PackWriter;
use crate::artifacts::transport::pkt_line::{read_lines, write_flush, write_line};
use crate::artifacts::transport::{Service, Transport};
use bytes::{BufMut, Bytes, BytesMut};
use std::path::{Path, PathBuf};

const RECEIVE_CAPABILITIES: &str = "report-status";

/// Serves another repository directory in-process
#[derive(Debug)]
pub struct LocalTransport {
    path: PathBuf,
}

impl LocalTransport {
    pub fn new(path: impl AsRef<Path>) -> Self {
        LocalTransport {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn open(&self) -> anyhow::Result<Repository> {
        if !self.path.is_dir() {
            anyhow::bail!("'{}' does not appear to be a repository", self.path.display());
        }

        let repository = Repository::new(&self.path.to_string_lossy(), Box::new(std::io::sink()))?;
        if !repository.is_initialized() {
            anyhow::bail!("'{}' does not appear to be a repository", self.path.display());
        }

        Ok(repository)
    }

    fn receive_pack(&self, repository: &Repository, body: &[u8]) -> anyhow::Result<Bytes> {
        let (commands, pack) = read_lines(body)?;

        let unpack_status = if pack.is_empty() {
            Ok(())
        } else {
            match PackReader::new(repository.database()).unpack(pack) {
                Ok(report) if report.is_complete() => Ok(()),
                Ok(report) => Err(format!("{} unresolved deltas", report.failures.len())),
                Err(err) => Err(err.to_string()),
            }
        };

        let mut response = BytesMut::new();
        match &unpack_status {
            Ok(()) => write_line(&mut response, b"unpack ok\n")?,
            Err(reason) => {
                tracing::warn!(path = %self.path.display(), "rejected pushed archive: {reason}");
                write_line(&mut response, format!("unpack {reason}\n").as_bytes())?
            }
        }

        for command in commands {
            let command = String::from_utf8_lossy(&command);
            let command = command.split('\0').next().unwrap_or_default().trim_end();

            let mut parts = command.splitn(3, ' ');
            let (Some(old), Some(new), Some(ref_name)) = (parts.next(), parts.next(), parts.next())
            else {
                anyhow::bail!("malformed push command {command:?}");
            };

            let status = match unpack_status {
                Ok(()) => Self::update_ref(repository, old, new, ref_name),
                Err(_) => Err("unpacker error".to_string()),
            };

            match status {
                Ok(()) => write_line(&mut response, format!("ok {ref_name}\n").as_bytes())?,
                Err(reason) => {
                    write_line(&mut response, format!("ng {ref_name} {reason}\n").as_bytes())?
                }
            }
        }

        write_flush(&mut response);
        Ok(response.freeze())
    }

    /// Move a branch from `old` to `new`, the way a push asks for it
    fn update_ref(
        repository: &Repository,
        old: &str,
        new: &str,
        ref_name: &str,
    ) -> Result<(), String> {
        let branch_name = ref_name
            .strip_prefix(REF_PREFIX)
            .and_then(|name| BranchName::try_parse(name.to_string()).ok())
            .ok_or_else(|| "funny refname".to_string())?;
        let old = ObjectId::try_parse(old.to_string()).map_err(|err| err.to_string())?;
        let new = ObjectId::try_parse(new.to_string()).map_err(|err| err.to_string())?;

        let current = repository
            .refs()
            .read_ref(&branch_name)
            .map_err(|err| err.to_string())?;
        let expected = (!old.is_null()).then_some(old);
        if current != expected {
            return Err("fetch first".to_string());
        }

        match repository.database().get(&new) {
            Ok(object) if object.object_type == ObjectType::Commit => {}
            Ok(_) => return Err("not a commit".to_string()),
            Err(_) => return Err("missing necessary objects".to_string()),
        }

        let refs = repository.refs();
        refs.update_ref(&branch_name, &new)
            .map_err(|err| err.to_string())?;
        if !refs.head_path().exists() {
            refs.set_head(&branch_name).map_err(|err| err.to_string())?;
        }

        tracing::info!(branch = %branch_name, oid = %new, "accepted push");
        Ok(())
    }

    fn upload_pack(&self, repository: &Repository, body: &[u8]) -> anyhow::Result<Bytes> {
        let (lines, _) = read_lines(body)?;
        let database = repository.database();

        for line in lines {
            let line = String::from_utf8_lossy(&line);
            let want = line
                .trim_end()
                .strip_prefix("want ")
                .ok_or_else(|| anyhow::anyhow!("unexpected fetch line {line:?}"))?;
            let want = ObjectId::try_parse(want.to_string())?;

            if !database.contains(&want) {
                anyhow::bail!("upload-pack: not our ref {want}");
            }
        }

        let object_ids = database.list_objects()?;
        let pack = PackWriter::build(database, &object_ids)?;

        let mut response = BytesMut::with_capacity(pack.len() + 8);
        write_line(&mut response, b"NAK\n")?;
        response.put_slice(&pack);

        tracing::info!(objects = object_ids.len(), "served fetch");
        Ok(response.freeze())
    }
}

impl Transport for LocalTransport {
    fn advertise_refs(&self, service: Service) -> anyhow::Result<Bytes> {
        let repository = self.open()?;
        let mut response = BytesMut::new();

        for (index, (branch_name, oid)) in repository.refs().list_branches()?.iter().enumerate() {
            let line = match (index, service) {
                (0, Service::ReceivePack) => {
                    format!("{oid} {}\0{RECEIVE_CAPABILITIES}\n", branch_name.to_sym_ref_name())
                }
                _ => format!("{oid} {}\n", branch_name.to_sym_ref_name()),
            };
            write_line(&mut response, line.as_bytes())?;
        }

        write_flush(&mut response);
        Ok(response.freeze())
    }

    fn request(&self, service: Service, body: Bytes) -> anyhow::Result<Bytes> {
        let repository = self.open()?;
        tracing::debug!(%service, path = %self.path.display(), size = body.len(), "local request");

        match service {
            Service::ReceivePack => self.receive_pack(&repository, &body),
            Service::UploadPack => self.upload_pack(&repository, &body),
        }
    }
}
