//! Commit object
//!
//! A commit records a tree snapshot, at most one parent (history is linear)
//! and the signatures of its author and committer. New commits use the same
//! signature for both.
//!
//! Payload layout:
//! ```text
//! tree <hex>
//! parent <hex>            (omitted on a root commit)
//! author <name> <<email>> <unix-seconds> <+hhmm>
//! committer <name> <<email>> <unix-seconds> <+hhmm>
//!
//! <message>
//! ```
//!
//! Messages are stored with trailing whitespace trimmed and exactly one `\n`
//! appended.

use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use std::io::BufRead;

const NAME_VAR: &str = "GIT_AUTHOR_NAME";
const EMAIL_VAR: &str = "GIT_AUTHOR_EMAIL";
const DATE_VAR: &str = "GIT_AUTHOR_DATE";

/// Who made a commit, and when
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Signature {
    name: String,
    email: String,
    when: DateTime<FixedOffset>,
}

impl Signature {
    pub fn new(name: String, email: String, when: DateTime<FixedOffset>) -> Self {
        Signature { name, email, when }
    }

    /// Build the signature for a new commit
    ///
    /// An explicit `Name <email>` wins; otherwise `GIT_AUTHOR_NAME` and
    /// `GIT_AUTHOR_EMAIL` must both be set. The time comes from
    /// `GIT_AUTHOR_DATE` when it parses, else the local clock.
    pub fn resolve(explicit: Option<&str>) -> anyhow::Result<Self> {
        let (name, email) = match explicit {
            Some(identity) => split_identity(identity)?,
            None => (
                std::env::var(NAME_VAR).with_context(|| format!("{NAME_VAR} not set"))?,
                std::env::var(EMAIL_VAR).with_context(|| format!("{EMAIL_VAR} not set"))?,
            ),
        };

        let when = date_override().unwrap_or_else(|| chrono::Local::now().fixed_offset());
        Ok(Signature::new(name, email, when))
    }

    pub fn when(&self) -> DateTime<FixedOffset> {
        self.when
    }

    /// `<name> <<email>> <unix-seconds> <+hhmm>`
    fn encode(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.when.timestamp(),
            self.when.format("%z")
        )
    }

    fn decode(line: &str) -> anyhow::Result<Self> {
        let mut fields = line.rsplitn(3, ' ');
        let (Some(zone), Some(seconds), Some(identity)) =
            (fields.next(), fields.next(), fields.next())
        else {
            anyhow::bail!("malformed signature {line:?}");
        };

        let (name, email) = split_identity(identity)?;
        let seconds = seconds
            .parse::<i64>()
            .with_context(|| format!("bad timestamp in signature {line:?}"))?;
        let offset = parse_zone(zone)
            .with_context(|| format!("bad timezone in signature {line:?}"))?;
        let when = DateTime::from_timestamp(seconds, 0)
            .with_context(|| format!("timestamp out of range in signature {line:?}"))?
            .with_timezone(&offset);

        Ok(Signature::new(name, email, when))
    }
}

fn split_identity(identity: &str) -> anyhow::Result<(String, String)> {
    let (name, rest) = identity
        .split_once('<')
        .with_context(|| format!("expected 'Name <email>', got {identity:?}"))?;
    let (email, _) = rest
        .rsplit_once('>')
        .with_context(|| format!("expected 'Name <email>', got {identity:?}"))?;

    Ok((name.trim().to_string(), email.to_string()))
}

/// `+hhmm` or `-hhmm`
fn parse_zone(zone: &str) -> Option<FixedOffset> {
    let (sign, digits) = match zone.split_at_checked(1)? {
        ("+", digits) => (1, digits),
        ("-", digits) => (-1, digits),
        _ => return None,
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hours = digits[..2].parse::<i32>().ok()?;
    let minutes = digits[2..].parse::<i32>().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn date_override() -> Option<DateTime<FixedOffset>> {
    let raw = std::env::var(DATE_VAR).ok()?;

    DateTime::parse_from_rfc2822(&raw)
        .or_else(|_| DateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S %z"))
        .ok()
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    tree_oid: ObjectId,
    parent: Option<ObjectId>,
    signature: Signature,
    committer: Signature,
    message: String,
}

impl Commit {
    pub fn new(
        parent: Option<ObjectId>,
        tree_oid: ObjectId,
        signature: Signature,
        message: &str,
    ) -> Self {
        Commit {
            tree_oid,
            parent,
            committer: signature.clone(),
            signature,
            message: format!("{}\n", message.trim_end()),
        }
    }

    /// First line of the message
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    pub fn parent(&self) -> Option<&ObjectId> {
        self.parent.as_ref()
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

impl Packable for Commit {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        Ok(Bytes::from(self.display()))
    }
}

impl Unpackable for Commit {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        let (headers, message) = content
            .split_once("\n\n")
            .context("commit has no blank line before its message")?;

        let mut tree_oid = None;
        let mut parent = None;
        let mut signature = None;
        let mut committer = None;

        for line in headers.lines() {
            let (key, value) = line
                .split_once(' ')
                .with_context(|| format!("malformed commit header {line:?}"))?;

            match key {
                "tree" => tree_oid = Some(ObjectId::try_parse(value.to_string())?),
                // only the first parent takes part in linear history
                "parent" if parent.is_none() => {
                    parent = Some(ObjectId::try_parse(value.to_string())?)
                }
                "author" => signature = Some(Signature::decode(value)?),
                "committer" => committer = Some(Signature::decode(value)?),
                _ => {}
            }
        }

        Ok(Commit {
            tree_oid: tree_oid.context("commit has no tree line")?,
            parent,
            signature: signature.context("commit has no author line")?,
            committer: committer.context("commit has no committer line")?,
            message: message.to_string(),
        })
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    fn display(&self) -> String {
        let mut payload = format!("tree {}\n", self.tree_oid);

        if let Some(parent) = &self.parent {
            payload.push_str(&format!("parent {parent}\n"));
        }
        payload.push_str(&format!(
            "author {}\ncommitter {}\n\n",
            self.signature.encode(),
            self.committer.encode()
        ));
        payload.push_str(&self.message);

        payload
    }
}
