use crate::artifacts::objects::entry_mode::FileMode;
use anyhow::Context;
use bytes::Bytes;
use std::path::{Path, PathBuf};

const IGNORED_PATHS: [&str; 3] = [".git", ".", ".."];

/// What a directory entry is, as far as snapshotting is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File(FileMode),
    Directory,
    /// Symlinks, sockets and fifos: never snapshotted
    Other,
}

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List the direct children of a directory, relative to the workspace root
    pub fn list_dir(&self, dir_path: Option<&Path>) -> anyhow::Result<Vec<PathBuf>> {
        let dir_path = match dir_path {
            Some(p) => self.path.join(p),
            None => self.path.to_path_buf(),
        };

        if !dir_path.is_dir() {
            anyhow::bail!("The specified path is not a directory: {:?}", dir_path);
        }

        let mut children = std::fs::read_dir(&dir_path)
            .with_context(|| format!("Unable to list directory {}", dir_path.display()))?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Unable to list directory {}", dir_path.display()))?
            .into_iter()
            .filter_map(|path| self.check_if_not_ignored_path(&path))
            .collect::<Vec<_>>();
        children.sort();

        Ok(children)
    }

    fn is_ignored(path: &Path) -> bool {
        path.file_name()
            .map(|name| IGNORED_PATHS.contains(&name.to_string_lossy().as_ref()))
            .unwrap_or(true)
    }

    fn check_if_not_ignored_path(&self, path: &Path) -> Option<PathBuf> {
        if !Self::is_ignored(path) {
            Some(path.strip_prefix(self.path.as_ref()).ok()?.to_path_buf())
        } else {
            None
        }
    }

    pub fn read_file(&self, file_path: &Path) -> anyhow::Result<Bytes> {
        let file_path = self.path.join(file_path);

        let content = std::fs::read(&file_path)
            .with_context(|| format!("Unable to read file {}", file_path.display()))?;

        Ok(Bytes::from(content))
    }

    /// Classify an entry without following symlinks
    pub fn stat_entry(&self, path: &Path) -> anyhow::Result<EntryKind> {
        let full_path = self.path.join(path);

        let metadata = std::fs::symlink_metadata(&full_path)
            .with_context(|| format!("Unable to stat {}", full_path.display()))?;

        if metadata.file_type().is_symlink() {
            return Ok(EntryKind::Other);
        }

        if metadata.is_dir() {
            Ok(EntryKind::Directory)
        } else if metadata.is_file() {
            if is_executable::is_executable(&full_path) {
                Ok(EntryKind::File(FileMode::Executable))
            } else {
                Ok(EntryKind::File(FileMode::Regular))
            }
        } else {
            Ok(EntryKind::Other)
        }
    }
}
