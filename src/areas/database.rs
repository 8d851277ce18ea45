//! Loose object database
//!
//! Every object lives in its own file under `objects/<2 hex>/<38 hex>`, holding
//! the zlib-compressed bytes of `<type> <len>\0<payload>`. The identity is always
//! derived from the uncompressed bytes, so it does not depend on the
//! compression level or implementation.

use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object::{Object, ObjectBox, RawObject, Unpackable, hash_object};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::errors::{IoResultExt, StoreError, StoreResult};
use anyhow::Context;
use bytes::Bytes;
use fake::rand;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
pub struct Database {
    path: Box<Path>,
}

impl Database {
    pub fn new(path: Box<Path>) -> Self {
        Database { path }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    /// Store a payload under its content identity
    ///
    /// Writing is idempotent: when an object with the same identity already
    /// exists, nothing is written and the identity is returned.
    pub fn put(&self, object_type: ObjectType, payload: &[u8]) -> StoreResult<ObjectId> {
        let object_id = hash_object(object_type, payload);
        let object_path = self.path.join(object_id.to_path());

        if object_path.exists() {
            tracing::trace!(oid = %object_id, "object already stored");
            return Ok(object_id);
        }

        let mut object_content = object_type.header(payload.len()).into_bytes();
        object_content.extend_from_slice(payload);

        self.write_object(&object_path, &object_content)?;
        tracing::debug!(
            oid = %object_id,
            kind = %object_type,
            size = payload.len(),
            "stored object"
        );

        Ok(object_id)
    }

    /// Serialize a typed object and store it
    pub fn store(&self, object: &impl Object) -> anyhow::Result<ObjectId> {
        let payload = object.serialize()?;

        self.put(object.object_type(), &payload)
            .with_context(|| format!("Unable to store {} object", object.object_type()))
    }

    /// Load an object's type and payload
    pub fn get(&self, object_id: &ObjectId) -> StoreResult<RawObject> {
        let object_path = self.path.join(object_id.to_path());

        let compressed = match std::fs::read(&object_path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(object_id.clone()));
            }
            Err(err) => return Err(err).with_path(object_path),
        };

        let content = Self::decompress(&compressed)
            .map_err(|err| StoreError::corrupt_object(object_id, err.to_string()))?;

        let mut reader = Cursor::new(content);
        let (object_type, declared_len) = ObjectType::parse_header(&mut reader)
            .map_err(|err| StoreError::corrupt_object(object_id, err.to_string()))?;

        let payload_start = reader.position() as usize;
        let payload = Bytes::from(reader.into_inner()).slice(payload_start..);

        if payload.len() != declared_len {
            return Err(StoreError::corrupt_object(
                object_id,
                format!(
                    "header declares {declared_len} bytes but payload has {}",
                    payload.len()
                ),
            ));
        }

        Ok(RawObject::new(object_type, payload))
    }

    pub fn contains(&self, object_id: &ObjectId) -> bool {
        self.path.join(object_id.to_path()).is_file()
    }

    pub fn parse_object(&self, object_id: &ObjectId) -> anyhow::Result<ObjectBox> {
        let object = self.get(object_id)?;
        let reader = Cursor::new(object.payload.clone());

        match object.object_type {
            ObjectType::Blob => Ok(ObjectBox::Blob(Box::new(Blob::deserialize(reader)?))),
            ObjectType::Tree => Ok(ObjectBox::Tree(Box::new(Tree::deserialize(reader)?))),
            ObjectType::Commit => Ok(ObjectBox::Commit(Box::new(Commit::deserialize(reader)?))),
            ObjectType::Tag => Ok(ObjectBox::Tag(Box::new(object))),
        }
    }

    pub fn parse_object_as_tree(&self, object_id: &ObjectId) -> anyhow::Result<Option<Tree>> {
        let object = self.get(object_id)?;

        match object.object_type {
            ObjectType::Tree => Ok(Some(Tree::deserialize(Cursor::new(object.payload))?)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_commit(&self, object_id: &ObjectId) -> anyhow::Result<Option<Commit>> {
        let object = self.get(object_id)?;

        match object.object_type {
            ObjectType::Commit => Ok(Some(Commit::deserialize(Cursor::new(object.payload))?)),
            _ => Ok(None),
        }
    }

    /// Enumerate every loose object by scanning the shard directories
    ///
    /// Identities are returned sorted so that archives built from the same
    /// store are byte-identical.
    pub fn list_objects(&self) -> StoreResult<Vec<ObjectId>> {
        let mut object_ids = Vec::new();

        for entry in WalkDir::new(&self.path).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|err| StoreError::IoFailure {
                path: err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.path.to_path_buf()),
                source: err.into(),
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let shard = entry
                .path()
                .parent()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            let file_name = entry.file_name().to_string_lossy();

            // skips temp files and anything else that is not <2 hex>/<38 hex>
            if shard.len() != 2 || file_name.len() != OBJECT_ID_LENGTH - 2 {
                continue;
            }

            if let Ok(oid) = ObjectId::try_parse(format!("{shard}{file_name}")) {
                object_ids.push(oid);
            }
        }

        object_ids.sort();
        Ok(object_ids)
    }

    /// Find all objects whose OID starts with the given prefix.
    ///
    /// Used to resolve abbreviated OIDs to their full form. More than one
    /// match means the prefix is ambiguous.
    pub fn find_objects_by_prefix(&self, prefix: &str) -> StoreResult<Vec<ObjectId>> {
        let prefix = prefix.to_ascii_lowercase();

        Ok(self
            .list_objects()?
            .into_iter()
            .filter(|oid| oid.as_ref().starts_with(&prefix))
            .collect())
    }

    fn write_object(&self, object_path: &Path, object_content: &[u8]) -> StoreResult<()> {
        let object_dir = object_path.parent().unwrap_or(&self.path);
        std::fs::create_dir_all(object_dir).with_path(object_dir)?;

        let temp_object_path = object_dir.join(Self::generate_temp_name());
        let object_content = Self::compress(object_content).with_path(&temp_object_path)?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_object_path)
            .with_path(&temp_object_path)?;

        // rename the temp file to the object file to make it atomic;
        // a concurrent writer of the same identity wrote identical bytes
        let written = file
            .write_all(&object_content)
            .with_path(&temp_object_path)
            .and_then(|_| {
                drop(file);
                std::fs::rename(&temp_object_path, object_path).with_path(object_path)
            });

        if written.is_err() {
            if let Err(err) = std::fs::remove_file(&temp_object_path) {
                tracing::warn!(path = %temp_object_path.display(), "{err}");
            }
        }

        written
    }

    fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut decompressed_content = Vec::new();
        decoder.read_to_end(&mut decompressed_content)?;

        Ok(decompressed_content)
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", rand::random::<u32>())
    }

    /// Path of the loose object file for an identity
    pub fn object_path(&self, object_id: &ObjectId) -> PathBuf {
        self.path.join(object_id.to_path())
    }
}
