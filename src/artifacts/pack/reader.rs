//! Archive decoder and delta resolver
//!
//! Entries are framed in archive order. Every reconstructed object is stored
//! right away and recorded in a ledger indexed by archive offset and by
//! identity, so deltas can find their bases:
//!
//! - offset-deltas look up an earlier entry in the ledger;
//! - hash-deltas look in the ledger first and then in the object database, since
//!   their base may predate the archive.
//!
//! A delta whose base is not known yet is set aside. Once every entry has been
//! framed, the set-aside deltas are retried until a pass resolves nothing new,
//! so a hash-delta may name a base that appears later in the archive. Whatever
//! is still unresolved is reported as a failure. Framing problems abort the
//! whole decode. The trailer is checked last, after every entry has been
//! stored, so a bad trailer leaves the decoded objects in place.

use crate::areas::database::Database;
use crate::artifacts::objects::RAW_OBJECT_ID_LENGTH;
use crate::artifacts::objects::object::RawObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::delta::apply_delta;
use crate::artifacts::pack::entry::{EntryKind, decode_base_offset, decode_entry_header};
use crate::artifacts::pack::header::PackHeader;
use crate::artifacts::pack::{CHECKSUM_SIZE, HEADER_SIZE, MAX_PREALLOC};
use crate::errors::{DeltaBase, StoreError, StoreResult};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::Read;

/// An entry that was reconstructed and stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedEntry {
    pub offset: u64,
    pub oid: ObjectId,
    pub object_type: ObjectType,
}

/// Outcome of a decode that got as far as the trailer
#[derive(Debug, Default)]
pub struct UnpackReport {
    /// Stored entries, in archive order
    pub entries: Vec<UnpackedEntry>,
    /// Entries skipped because their delta base could not be found
    pub failures: Vec<StoreError>,
}

impl UnpackReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

struct LedgerRecord {
    oid: ObjectId,
    object: RawObject,
}

/// Every entry reconstructed so far
#[derive(Default)]
struct Ledger {
    records: Vec<LedgerRecord>,
    by_offset: HashMap<u64, usize>,
    by_oid: HashMap<ObjectId, usize>,
}

impl Ledger {
    fn push(&mut self, offset: u64, oid: ObjectId, object: RawObject) {
        let index = self.records.len();
        self.by_offset.insert(offset, index);
        self.by_oid.entry(oid.clone()).or_insert(index);
        self.records.push(LedgerRecord { oid, object });
    }

    fn by_offset(&self, offset: u64) -> Option<&RawObject> {
        self.by_offset
            .get(&offset)
            .map(|index| &self.records[*index].object)
    }

    fn by_oid(&self, oid: &ObjectId) -> Option<&RawObject> {
        self.by_oid.get(oid).map(|index| {
            let record = &self.records[*index];
            debug_assert_eq!(&record.oid, oid);
            &record.object
        })
    }
}

/// One entry as framed in the archive, before reconstruction
struct RawEntry {
    offset: u64,
    kind: EntryKind,
    declared_size: u64,
    base: Option<DeltaBase>,
    data: Bytes,
}

/// Decodes one archive into an object database
pub struct PackReader<'d> {
    database: &'d Database,
    ledger: Ledger,
}

impl<'d> PackReader<'d> {
    pub fn new(database: &'d Database) -> Self {
        PackReader {
            database,
            ledger: Ledger::default(),
        }
    }

    /// Decode `pack`, storing every object that can be reconstructed
    pub fn unpack(mut self, pack: &[u8]) -> StoreResult<UnpackReport> {
        let header = PackHeader::parse(pack)?;
        tracing::debug!(
            version = header.version(),
            entries = header.entries_count(),
            size = pack.len(),
            "unpacking archive"
        );

        let mut report = UnpackReport::default();
        let mut deferred = Vec::new();
        let mut pos = HEADER_SIZE;

        for _ in 0..header.entries_count() {
            let (entry, used) = Self::read_entry(pack, pos)?;
            pos += used;

            if !self.try_store(&entry, &mut report)? {
                tracing::debug!(offset = entry.offset, "delta base not known yet");
                deferred.push(entry);
            }
        }

        while !deferred.is_empty() {
            let pending = deferred.len();
            let mut still_missing = Vec::new();

            for entry in deferred {
                if !self.try_store(&entry, &mut report)? {
                    still_missing.push(entry);
                }
            }

            deferred = still_missing;
            if deferred.len() == pending {
                break;
            }
        }

        for entry in deferred {
            if let Some(base) = entry.base {
                let err = StoreError::MissingDeltaBase {
                    offset: entry.offset,
                    base,
                };
                tracing::debug!("{err}");
                report.failures.push(err);
            }
        }
        report.entries.sort_by_key(|entry| entry.offset);

        Self::verify_trailer(pack, pos)?;

        if !report.is_complete() {
            tracing::warn!(
                failed = report.failures.len(),
                stored = report.entries.len(),
                "archive unpacked with unresolved deltas"
            );
        }

        Ok(report)
    }

    /// Reconstruct and store one entry
    ///
    /// Returns `false` when the entry is a delta whose base is not known yet.
    fn try_store(&mut self, entry: &RawEntry, report: &mut UnpackReport) -> StoreResult<bool> {
        let object = match self.reconstruct(entry) {
            Ok(object) => object,
            Err(StoreError::MissingDeltaBase { .. }) => return Ok(false),
            Err(err) => return Err(err),
        };

        let oid = self.database.put(object.object_type, &object.payload)?;
        report.entries.push(UnpackedEntry {
            offset: entry.offset,
            oid: oid.clone(),
            object_type: object.object_type,
        });
        self.ledger.push(entry.offset, oid, object);

        Ok(true)
    }

    fn read_entry(pack: &[u8], start: usize) -> StoreResult<(RawEntry, usize)> {
        let offset = start as u64;
        let rest = pack
            .get(start..)
            .ok_or_else(|| {
                StoreError::corrupt_archive(offset, "entry starts past end of archive")
            })?;

        let (code, declared_size, mut pos) = decode_entry_header(rest)
            .ok_or_else(|| StoreError::corrupt_archive(offset, "truncated entry header"))?;
        let kind = EntryKind::from_code(code)
            .ok_or_else(|| {
                StoreError::corrupt_archive(offset, format!("invalid type code {code}"))
            })?;

        let base = match kind {
            EntryKind::Whole(_) => None,
            EntryKind::OfsDelta => {
                let (distance, used) = decode_base_offset(&rest[pos..])
                    .ok_or_else(|| StoreError::corrupt_archive(offset, "truncated base offset"))?;
                pos += used;

                let base_offset = offset
                    .checked_sub(distance)
                    .filter(|base_offset| distance > 0 && *base_offset >= HEADER_SIZE as u64)
                    .ok_or_else(|| {
                        StoreError::corrupt_archive(
                            offset,
                            format!("base offset distance {distance} is out of range"),
                        )
                    })?;
                Some(DeltaBase::Offset(base_offset))
            }
            EntryKind::RefDelta => {
                let raw: &[u8; RAW_OBJECT_ID_LENGTH] = rest
                    .get(pos..pos + RAW_OBJECT_ID_LENGTH)
                    .and_then(|raw| raw.try_into().ok())
                    .ok_or_else(|| StoreError::corrupt_archive(offset, "truncated base identity"))?;
                pos += RAW_OBJECT_ID_LENGTH;
                Some(DeltaBase::Oid(ObjectId::from_raw(raw)))
            }
        };

        // a whole entry may not inflate past its declared size
        let limit = (!kind.is_delta()).then_some(declared_size.saturating_add(1));
        let (data, used) = Self::inflate(&rest[pos..], declared_size, limit)
            .map_err(|err| StoreError::corrupt_archive(offset, format!("inflate failed: {err}")))?;
        pos += used;

        Ok((
            RawEntry {
                offset,
                kind,
                declared_size,
                base,
                data: Bytes::from(data),
            },
            pos,
        ))
    }

    /// Inflate one zlib stream from the front of `data`
    ///
    /// Returns the inflated bytes and how many compressed bytes the stream used.
    /// With a `limit`, output stops there; a caller that sees `limit` bytes back
    /// knows the stream is longer than allowed.
    fn inflate(
        data: &[u8],
        size_hint: u64,
        limit: Option<u64>,
    ) -> std::io::Result<(Vec<u8>, usize)> {
        let mut decoder = flate2::bufread::ZlibDecoder::new(data);
        let mut inflated = Vec::with_capacity((size_hint as usize).min(MAX_PREALLOC));

        match limit {
            Some(limit) => (&mut decoder).take(limit).read_to_end(&mut inflated)?,
            None => decoder.read_to_end(&mut inflated)?,
        };

        Ok((inflated, decoder.total_in() as usize))
    }

    fn reconstruct(&self, entry: &RawEntry) -> StoreResult<RawObject> {
        let offset = entry.offset;
        let data_len = entry.data.len();

        let (object_type, payload) = match (entry.kind, &entry.base) {
            (EntryKind::Whole(object_type), _) => (object_type, entry.data.clone()),
            (_, Some(base)) => {
                let base_object = match base {
                    DeltaBase::Offset(base_offset) => self.ledger.by_offset(*base_offset).cloned(),
                    DeltaBase::Oid(base_oid) => match self.ledger.by_oid(base_oid) {
                        Some(object) => Some(object.clone()),
                        None => match self.database.get(base_oid) {
                            Ok(object) => Some(object),
                            Err(StoreError::NotFound(_)) => None,
                            Err(err) => return Err(err),
                        },
                    },
                };
                let base_object = base_object.ok_or_else(|| StoreError::MissingDeltaBase {
                    offset,
                    base: base.clone(),
                })?;

                let payload = apply_delta(&base_object.payload, &entry.data)
                    .map_err(|err| StoreError::corrupt_archive(offset, err.to_string()))?;
                (base_object.object_type, Bytes::from(payload))
            }
            (_, None) => {
                return Err(StoreError::corrupt_archive(offset, "delta entry without a base"));
            }
        };

        // git itself declares the delta stream length for delta entries
        let size_matches = payload.len() as u64 == entry.declared_size
            || (entry.kind.is_delta() && data_len as u64 == entry.declared_size);
        if !size_matches {
            return Err(StoreError::corrupt_archive(
                offset,
                format!(
                    "entry declares {} bytes but reconstructs {}",
                    entry.declared_size,
                    payload.len()
                ),
            ));
        }

        Ok(RawObject::new(object_type, payload))
    }

    fn verify_trailer(pack: &[u8], consumed: usize) -> StoreResult<()> {
        let trailer = pack
            .get(consumed..consumed + CHECKSUM_SIZE)
            .ok_or_else(|| StoreError::corrupt_archive(consumed as u64, "truncated trailer"))?;

        let checksum = Sha1::digest(&pack[..consumed]);
        if checksum.as_slice() != trailer {
            return Err(StoreError::corrupt_archive(
                consumed as u64,
                "trailer does not match archive contents",
            ));
        }

        let trailing = pack.len() - consumed - CHECKSUM_SIZE;
        if trailing > 0 {
            return Err(StoreError::corrupt_archive(
                (consumed + CHECKSUM_SIZE) as u64,
                format!("{trailing} unexpected bytes after trailer"),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::object::hash_object;
    use crate::artifacts::pack::delta::DeltaBuilder;
    use crate::artifacts::pack::entry::encode_entry_header;
    use crate::artifacts::pack::writer::PackWriter;
    use assert_fs::TempDir;
    use bytes::{BufMut, BytesMut};
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn temp_database() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());
        (dir, database)
    }

    /// Frame hand-built entry bytes into an archive with a valid trailer
    fn raw_pack(entries_count: u32, body: &[u8]) -> Vec<u8> {
        let mut pack = b"PACK\x00\x00\x00\x02".to_vec();
        pack.extend_from_slice(&entries_count.to_be_bytes());
        pack.extend_from_slice(body);
        let checksum = Sha1::digest(&pack);
        pack.extend_from_slice(checksum.as_slice());
        pack
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn whole_objects_round_trip_with_their_identities() {
        let (_dir, database) = temp_database();
        let objects: [(ObjectType, &[u8]); 3] = [
            (ObjectType::Blob, b"hello\n"),
            (ObjectType::Blob, b""),
            (ObjectType::Tree, b""),
        ];

        let mut writer = PackWriter::new().unwrap();
        for (object_type, payload) in objects {
            writer.write_object(object_type, payload).unwrap();
        }
        let pack = writer.finish();

        let report = PackReader::new(&database).unpack(&pack).unwrap();

        assert!(report.is_complete());
        let oids: Vec<_> = report.entries.iter().map(|entry| entry.oid.clone()).collect();
        let expected: Vec<_> = objects
            .iter()
            .map(|(object_type, payload)| hash_object(*object_type, payload))
            .collect();
        assert_eq!(oids, expected);
        assert_eq!(oids[0].as_ref(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert_eq!(
            database.get(&oids[0]).unwrap(),
            RawObject::new(ObjectType::Blob, Bytes::from_static(b"hello\n"))
        );
    }

    #[test]
    fn chained_offset_and_hash_deltas_resolve() {
        let (_dir, database) = temp_database();
        let v1: &[u8] = b"fn main() {}\n";
        let v2: &[u8] = b"fn main() { println!(\"hi\"); }\n";
        let v3: &[u8] = b"fn main() { println!(\"hi\"); }\n// end\n";
        let v4: &[u8] = b"// start\nfn main() { println!(\"hi\"); }\n// end\n";

        let mut writer = PackWriter::new().unwrap();
        let base = writer.write_object(ObjectType::Blob, v1).unwrap();
        let second = writer
            .write_ofs_delta(base, &DeltaBuilder::diff(v1, v2))
            .unwrap();
        writer
            .write_ofs_delta(second, &DeltaBuilder::diff(v2, v3))
            .unwrap();
        writer
            .write_ref_delta(&hash_object(ObjectType::Blob, v3), &DeltaBuilder::diff(v3, v4))
            .unwrap();
        let pack = writer.finish();

        let report = PackReader::new(&database).unpack(&pack).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.entries.len(), 4);
        for (entry, payload) in report.entries.iter().zip([v1, v2, v3, v4]) {
            assert_eq!(entry.oid, hash_object(ObjectType::Blob, payload));
            assert_eq!(database.get(&entry.oid).unwrap().payload.as_ref(), payload);
        }
    }

    #[test]
    fn full_copy_delta_reproduces_its_base() {
        let (_dir, database) = temp_database();
        let payload: &[u8] = b"tree-shaped bytes";

        let mut writer = PackWriter::new().unwrap();
        let base = writer.write_object(ObjectType::Tree, payload).unwrap();
        let mut builder = DeltaBuilder::new(payload.len());
        builder.copy(0, payload.len());
        writer.write_ofs_delta(base, &builder.finish()).unwrap();

        let report = PackReader::new(&database)
            .unpack(&writer.finish())
            .unwrap();

        assert_eq!(report.entries[0].oid, report.entries[1].oid);
        assert_eq!(report.entries[1].object_type, ObjectType::Tree);
    }

    #[test]
    fn hash_delta_base_may_predate_the_archive() {
        let (_dir, database) = temp_database();
        let base = database.put(ObjectType::Blob, b"already here\n").unwrap();

        let mut writer = PackWriter::new().unwrap();
        writer
            .write_ref_delta(&base, &DeltaBuilder::diff(b"already here\n", b"already there\n"))
            .unwrap();
        let report = PackReader::new(&database)
            .unpack(&writer.finish())
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(
            database.get(&report.entries[0].oid).unwrap().payload.as_ref(),
            b"already there\n"
        );
    }

    #[test]
    fn hash_delta_may_precede_its_base() {
        let (_dir, database) = temp_database();
        let base_payload: &[u8] = b"base object\n";
        let base_oid = hash_object(ObjectType::Blob, base_payload);

        let mut writer = PackWriter::new().unwrap();
        let forward = writer
            .write_ref_delta(&base_oid, &DeltaBuilder::diff(base_payload, b"base object!\n"))
            .unwrap();
        let dependant = writer
            .write_ofs_delta(forward, &DeltaBuilder::diff(b"base object!\n", b"x"))
            .unwrap();
        let base = writer.write_object(ObjectType::Blob, base_payload).unwrap();

        let report = PackReader::new(&database)
            .unpack(&writer.finish())
            .unwrap();

        assert!(report.is_complete());
        let resolved: Vec<_> = report
            .entries
            .iter()
            .map(|entry| (entry.offset, entry.oid.clone()))
            .collect();
        assert_eq!(
            resolved,
            vec![
                (forward, hash_object(ObjectType::Blob, b"base object!\n")),
                (dependant, hash_object(ObjectType::Blob, b"x")),
                (base, base_oid),
            ]
        );
        assert_eq!(
            database
                .get(&hash_object(ObjectType::Blob, b"x"))
                .unwrap()
                .payload
                .as_ref(),
            b"x"
        );
    }

    #[test]
    fn unknown_hash_delta_base_fails_with_its_dependants() {
        let (_dir, database) = temp_database();
        let absent: &[u8] = b"never packed\n";

        let mut writer = PackWriter::new().unwrap();
        let orphan = writer
            .write_ref_delta(
                &hash_object(ObjectType::Blob, absent),
                &DeltaBuilder::diff(absent, b"never packed!\n"),
            )
            .unwrap();
        let dependant = writer
            .write_ofs_delta(orphan, &DeltaBuilder::diff(b"never packed!\n", b"y"))
            .unwrap();
        writer.write_object(ObjectType::Blob, b"unrelated\n").unwrap();

        let report = PackReader::new(&database)
            .unpack(&writer.finish())
            .unwrap();

        assert_eq!(report.entries.len(), 1);
        assert!(database.contains(&hash_object(ObjectType::Blob, b"unrelated\n")));

        let failed_offsets: Vec<_> = report
            .failures
            .iter()
            .map(|failure| match failure {
                StoreError::MissingDeltaBase { offset, .. } => *offset,
                other => panic!("unexpected failure {other}"),
            })
            .collect();
        assert_eq!(failed_offsets, vec![orphan, dependant]);
    }

    #[test]
    fn whole_entry_inflating_past_its_size_aborts() {
        let (_dir, database) = temp_database();

        let mut body = BytesMut::new();
        encode_entry_header(EntryKind::Whole(ObjectType::Blob), 4, &mut body);
        body.put_slice(&zlib(&vec![b'z'; 1 << 20]));

        assert!(matches!(
            PackReader::new(&database).unpack(&raw_pack(1, &body)),
            Err(StoreError::CorruptArchive { offset, .. }) if offset == HEADER_SIZE as u64
        ));
        assert!(database.list_objects().unwrap_or_default().is_empty());
    }

    #[test]
    fn corrupt_trailer_keeps_persisted_objects() {
        let (_dir, database) = temp_database();

        let mut writer = PackWriter::new().unwrap();
        writer.write_object(ObjectType::Blob, b"one\n").unwrap();
        writer.write_object(ObjectType::Blob, b"two\n").unwrap();
        let mut pack = writer.finish().to_vec();
        let last = pack.len() - 1;
        pack[last] ^= 0xff;

        let result = PackReader::new(&database).unpack(&pack);

        assert!(matches!(result, Err(StoreError::CorruptArchive { .. })));
        assert!(database.contains(&hash_object(ObjectType::Blob, b"one\n")));
        assert!(database.contains(&hash_object(ObjectType::Blob, b"two\n")));
    }

    #[test]
    fn truncated_trailer_is_corrupt() {
        let (_dir, database) = temp_database();

        let mut writer = PackWriter::new().unwrap();
        writer.write_object(ObjectType::Blob, b"one\n").unwrap();
        let pack = writer.finish();

        let result = PackReader::new(&database).unpack(&pack[..pack.len() - 5]);
        assert!(matches!(result, Err(StoreError::CorruptArchive { .. })));
    }

    #[test]
    fn declared_size_mismatch_aborts() {
        let (_dir, database) = temp_database();

        let mut body = BytesMut::new();
        encode_entry_header(EntryKind::Whole(ObjectType::Blob), 10, &mut body);
        body.put_slice(&zlib(b"hello\n"));

        let result = PackReader::new(&database).unpack(&raw_pack(1, &body));

        assert!(matches!(
            result,
            Err(StoreError::CorruptArchive { offset, .. }) if offset == HEADER_SIZE as u64
        ));
        assert!(database.list_objects().unwrap_or_default().is_empty());
    }

    #[test]
    fn reserved_type_code_aborts() {
        let (_dir, database) = temp_database();

        let mut body = vec![0x50];
        body.extend_from_slice(&zlib(b""));

        assert!(matches!(
            PackReader::new(&database).unpack(&raw_pack(1, &body)),
            Err(StoreError::CorruptArchive { .. })
        ));
    }

    #[test]
    fn offset_delta_cannot_point_before_first_entry() {
        let (_dir, database) = temp_database();

        let mut body = BytesMut::new();
        encode_entry_header(EntryKind::OfsDelta, 0, &mut body);
        crate::artifacts::pack::entry::encode_base_offset(HEADER_SIZE as u64, &mut body);
        body.put_slice(&zlib(&[0x00, 0x00]));

        assert!(matches!(
            PackReader::new(&database).unpack(&raw_pack(1, &body)),
            Err(StoreError::CorruptArchive { .. })
        ));
    }

    #[test]
    fn delta_with_overflowing_size_is_corrupt() {
        let (_dir, database) = temp_database();
        let mut delta = vec![0xff; 10];
        delta.extend_from_slice(&[0x01, 0x00]);

        let mut writer = PackWriter::new().unwrap();
        writer.write_object(ObjectType::Blob, b"abc").unwrap();
        let delta_offset = writer.next_offset();
        let mut body = BytesMut::new();
        encode_entry_header(EntryKind::OfsDelta, delta.len() as u64, &mut body);
        let distance = delta_offset - HEADER_SIZE as u64;
        crate::artifacts::pack::entry::encode_base_offset(distance, &mut body);
        body.put_slice(&zlib(&delta));

        let first = writer.finish();
        let mut entries = first[HEADER_SIZE..first.len() - CHECKSUM_SIZE].to_vec();
        entries.extend_from_slice(&body);

        assert!(matches!(
            PackReader::new(&database).unpack(&raw_pack(2, &entries)),
            Err(StoreError::CorruptArchive { offset, .. }) if offset == delta_offset
        ));
    }

    #[test]
    fn delta_sized_like_git_writes_it_is_accepted() {
        let (_dir, database) = temp_database();
        let delta = DeltaBuilder::diff(b"abc", b"abcd");

        let mut writer = PackWriter::new().unwrap();
        writer.write_object(ObjectType::Blob, b"abc").unwrap();
        let mut body = BytesMut::new();
        encode_entry_header(EntryKind::OfsDelta, delta.len() as u64, &mut body);
        let distance = writer.next_offset() - HEADER_SIZE as u64;
        crate::artifacts::pack::entry::encode_base_offset(distance, &mut body);
        body.put_slice(&zlib(&delta));

        let first = writer.finish();
        let mut entries = first[HEADER_SIZE..first.len() - CHECKSUM_SIZE].to_vec();
        entries.extend_from_slice(&body);

        let report = PackReader::new(&database)
            .unpack(&raw_pack(2, &entries))
            .unwrap();
        assert_eq!(report.entries[1].oid, hash_object(ObjectType::Blob, b"abcd"));
    }
}
