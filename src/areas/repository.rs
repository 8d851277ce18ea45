use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::areas::workspace::Workspace;
use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::artifacts::objects::object_id::ObjectId;
use std::cell::{RefCell, RefMut};
use std::path::Path;

/// Shortest abbreviated identity accepted on the command line
const MIN_PREFIX_LENGTH: usize = 4;

/// Name of the metadata directory inside a repository
pub const GIT_DIR: &str = ".git";

pub struct Repository {
    path: Box<Path>,
    writer: RefCell<Box<dyn std::io::Write>>,
    database: Database,
    workspace: Workspace,
    refs: Refs,
}

impl Repository {
    pub fn new(path: &str, writer: Box<dyn std::io::Write>) -> anyhow::Result<Self> {
        let path = Path::new(path);

        if !path.exists() {
            std::fs::create_dir_all(path)?;
        }
        let path = path.canonicalize()?;

        let database = Database::new(path.join(GIT_DIR).join("objects").into_boxed_path());
        let workspace = Workspace::new(path.clone().into_boxed_path());
        let refs = Refs::new(path.join(GIT_DIR).into_boxed_path());

        Ok(Repository {
            path: path.into_boxed_path(),
            writer: RefCell::new(writer),
            database,
            workspace,
            refs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git_path(&self) -> Box<Path> {
        self.path.join(GIT_DIR).into_boxed_path()
    }

    /// Whether `init` has been run for this repository
    pub fn is_initialized(&self) -> bool {
        self.database.objects_path().is_dir()
    }

    pub fn writer(&'_ self) -> RefMut<'_, Box<dyn std::io::Write>> {
        self.writer.borrow_mut()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    /// Resolve `HEAD`, a full identity or an unambiguous abbreviation
    pub fn resolve_revision(&self, revision: &str) -> anyhow::Result<ObjectId> {
        if revision == "HEAD" {
            return self
                .refs
                .read_head()?
                .ok_or_else(|| anyhow::anyhow!("HEAD does not point at a commit yet"));
        }

        if revision.len() == OBJECT_ID_LENGTH {
            return ObjectId::try_parse(revision.to_string());
        }

        if revision.len() < MIN_PREFIX_LENGTH
            || !revision.chars().all(|c| c.is_ascii_hexdigit())
        {
            anyhow::bail!("Not a valid object name {revision}");
        }

        let mut candidates = self.database.find_objects_by_prefix(revision)?;
        match candidates.len() {
            0 => anyhow::bail!("Not a valid object name {revision}"),
            1 => Ok(candidates.remove(0)),
            _ => anyhow::bail!("short object ID {revision} is ambiguous"),
        }
    }
}
