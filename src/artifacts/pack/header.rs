use crate::artifacts::objects::object::Packable;
use crate::artifacts::pack::{HEADER_SIZE, SIGNATURE, SUPPORTED_VERSIONS, VERSION};
use crate::errors::{StoreError, StoreResult};
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct PackHeader {
    pub(crate) version: u32,
    pub(crate) entries_count: u32,
}

impl PackHeader {
    /// Header written before the entry count is known
    pub(crate) fn empty() -> Self {
        PackHeader {
            version: VERSION,
            entries_count: 0,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn entries_count(&self) -> u32 {
        self.entries_count
    }

    /// Parse and validate the leading bytes of an archive
    pub fn parse(bytes: &[u8]) -> StoreResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StoreError::corrupt_archive(0, "truncated archive header"));
        }

        if &bytes[0..4] != SIGNATURE.as_bytes() {
            return Err(StoreError::corrupt_archive(
                0,
                format!(
                    "bad signature {:?}",
                    String::from_utf8_lossy(&bytes[0..4])
                ),
            ));
        }

        let version = byteorder::NetworkEndian::read_u32(&bytes[4..8]);
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(StoreError::corrupt_archive(
                4,
                format!("unsupported version {version}"),
            ));
        }

        let entries_count = byteorder::NetworkEndian::read_u32(&bytes[8..12]);

        Ok(PackHeader {
            version,
            entries_count,
        })
    }

    /// Overwrite the entry count of an already serialized header
    pub(crate) fn patch_entries_count(buffer: &mut [u8], entries_count: u32) {
        byteorder::NetworkEndian::write_u32(&mut buffer[8..12], entries_count);
    }
}

impl Packable for PackHeader {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.write_all(SIGNATURE.as_bytes())?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.version)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.entries_count)?;

        Ok(Bytes::from(bytes))
    }
}
