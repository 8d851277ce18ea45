//! Transport boundary
//!
//! Pushing and pulling exchange pack archives with another repository through a
//! [`Transport`], which only knows how to advertise references and answer one
//! request per service. The bodies use pkt-line framing:
//!
//! - push: `<old> <new> refs/heads/<branch>\0report-status\n`, flush, pack
//! - fetch: `want <oid>\n`, flush; answered by `NAK\n` and a pack

pub mod local;
pub mod pkt_line;

use crate::artifacts::objects::object_id::ObjectId;
use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Receives pushed archives
    ReceivePack,
    /// Serves archives for fetching
    UploadPack,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::ReceivePack => "git-receive-pack",
            Service::UploadPack => "git-upload-pack",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Send-request, receive-bytes primitive towards another repository
pub trait Transport {
    /// pkt-line list of `<oid> <refname>` the remote currently holds
    fn advertise_refs(&self, service: Service) -> anyhow::Result<Bytes>;

    fn request(&self, service: Service, body: Bytes) -> anyhow::Result<Bytes>;
}

/// A reference as advertised by a remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub name: String,
    pub oid: ObjectId,
}

/// Parse an advertisement, dropping capabilities after the first NUL
pub fn parse_advertisement(data: &[u8]) -> anyhow::Result<Vec<RemoteRef>> {
    let (lines, _) = pkt_line::read_lines(data)?;

    lines
        .iter()
        .map(|line| -> anyhow::Result<RemoteRef> {
            let line = std::str::from_utf8(line)?;
            let line = line.split('\0').next().unwrap_or_default().trim_end();
            let (oid, name) = line
                .split_once(' ')
                .ok_or_else(|| anyhow::anyhow!("malformed ref advertisement {line:?}"))?;

            Ok(RemoteRef {
                name: name.to_string(),
                oid: ObjectId::try_parse(oid.to_string())?,
            })
        })
        .collect()
}

/// Parse a `report-status` answer into the unpack status and per-ref results
pub fn parse_report(data: &[u8]) -> anyhow::Result<(String, Vec<String>)> {
    let (lines, _) = pkt_line::read_lines(data)?;
    let mut lines = lines
        .iter()
        .map(|line| String::from_utf8_lossy(line).trim_end().to_string());

    let unpack = lines
        .next()
        .and_then(|line| line.strip_prefix("unpack ").map(str::to_string))
        .ok_or_else(|| anyhow::anyhow!("missing unpack status in push report"))?;

    Ok((unpack, lines.collect()))
}
