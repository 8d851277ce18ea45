use crate::areas::database::Database;
use crate::artifacts::objects::object::Packable;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::HEADER_SIZE;
use crate::artifacts::pack::entry::{EntryKind, encode_base_offset, encode_entry_header};
use crate::artifacts::pack::header::PackHeader;
use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use sha1::{Digest, Sha1};
use std::io::Write;

/// Archive encoder
///
/// Entries are appended to a buffer owned by the writer. The entry count in the
/// header is a placeholder until [`PackWriter::finish`] patches it and appends
/// the trailer.
#[derive(Debug)]
pub struct PackWriter {
    buffer: BytesMut,
    entries_count: u32,
}

impl PackWriter {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_capacity(HEADER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> anyhow::Result<Self> {
        let mut buffer = BytesMut::with_capacity(capacity.max(HEADER_SIZE));
        buffer.put_slice(&PackHeader::empty().serialize()?);

        Ok(PackWriter {
            buffer,
            entries_count: 0,
        })
    }

    /// Pack the given objects whole, in the order given
    pub fn build(database: &Database, object_ids: &[ObjectId]) -> anyhow::Result<Bytes> {
        let mut writer = PackWriter::new()?;

        for object_id in object_ids {
            let object = database
                .get(object_id)
                .with_context(|| format!("Unable to pack object {object_id}"))?;
            writer.write_object(object.object_type, &object.payload)?;
        }

        Ok(writer.finish())
    }

    /// Offset the next entry will be written at (the bytes written so far)
    pub fn next_offset(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn entries_count(&self) -> u32 {
        self.entries_count
    }

    /// Append a whole object and return the offset of its entry
    pub fn write_object(&mut self, object_type: ObjectType, payload: &[u8]) -> anyhow::Result<u64> {
        let offset = self.next_offset();

        encode_entry_header(
            EntryKind::Whole(object_type),
            payload.len() as u64,
            &mut self.buffer,
        );
        self.write_compressed(payload)?;

        tracing::trace!(offset, kind = %object_type, size = payload.len(), "packed object");
        self.entries_count += 1;
        Ok(offset)
    }

    /// Append a delta against the entry written at `base_offset`
    pub fn write_ofs_delta(&mut self, base_offset: u64, delta: &[u8]) -> anyhow::Result<u64> {
        let offset = self.next_offset();
        if base_offset < HEADER_SIZE as u64 || base_offset >= offset {
            anyhow::bail!("delta base offset {base_offset} does not precede entry at {offset}");
        }

        let result_size = Self::result_size(delta)?;
        encode_entry_header(EntryKind::OfsDelta, result_size, &mut self.buffer);
        encode_base_offset(offset - base_offset, &mut self.buffer);
        self.write_compressed(delta)?;

        tracing::trace!(offset, base_offset, size = result_size, "packed offset delta");
        self.entries_count += 1;
        Ok(offset)
    }

    /// Append a delta against the object with identity `base`
    pub fn write_ref_delta(&mut self, base: &ObjectId, delta: &[u8]) -> anyhow::Result<u64> {
        let offset = self.next_offset();

        let result_size = Self::result_size(delta)?;
        encode_entry_header(EntryKind::RefDelta, result_size, &mut self.buffer);
        self.buffer.put_slice(&base.to_raw());
        self.write_compressed(delta)?;

        tracing::trace!(offset, base = %base, size = result_size, "packed hash delta");
        self.entries_count += 1;
        Ok(offset)
    }

    /// Patch the entry count and append the SHA-1 trailer
    pub fn finish(mut self) -> Bytes {
        PackHeader::patch_entries_count(&mut self.buffer[..HEADER_SIZE], self.entries_count);

        let checksum = Sha1::digest(&self.buffer);
        self.buffer.put_slice(checksum.as_slice());

        tracing::debug!(
            entries = self.entries_count,
            size = self.buffer.len(),
            "finished pack"
        );
        self.buffer.freeze()
    }

    fn result_size(delta: &[u8]) -> anyhow::Result<u64> {
        let (_, result_size) = crate::artifacts::pack::delta::delta_sizes(delta)?;
        Ok(result_size)
    }

    fn write_compressed(&mut self, data: &[u8]) -> anyhow::Result<()> {
        let mut encoder = ZlibEncoder::new((&mut self.buffer).writer(), Compression::default());
        encoder.write_all(data)?;
        encoder.finish()?;

        Ok(())
    }
}
