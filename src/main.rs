use anyhow::Result;
use bitpack::areas::repository::Repository;
use bitpack::commands::plumbing::cat_file::CatFileMode;
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bitpack",
    version = "0.1.0",
    about = "A content-addressable object store with pack archives",
    long_about = "This is a small git-compatible object store, written in Rust. \
    It snapshots directories into blobs, trees and commits, and exchanges them \
    with other repositories as pack archives.",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
",
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        name = "init",
        about = "Initialize a new repository",
        long_about = "This command initializes a new repository in the current directory or at the specified path."
    )]
    Init {
        #[arg(index = 1, help = "The path to the repository")]
        path: Option<String>,
    },
    #[command(
        name = "hash-object",
        about = "Hash an object and optionally write it to the object database",
        long_about = "This command hashes an object file and can write it to the object database. \
        It requires the path to the file to be specified."
    )]
    HashObject {
        #[arg(short, long, required = false, help = "Write the object to the object database")]
        write: bool,
        #[arg(index = 1)]
        file: String,
    },
    #[command(
        name = "cat-file",
        about = "Print the content, type or size of an object",
        group(ArgGroup::new("mode").required(true).args(["pretty", "kind", "size"]))
    )]
    CatFile {
        #[arg(short = 'p', help = "Pretty-print the object content")]
        pretty: bool,
        #[arg(short = 't', help = "Print the object type")]
        kind: bool,
        #[arg(short = 's', help = "Print the object size")]
        size: bool,
        #[arg(index = 1, help = "The object SHA, an abbreviation of it, or HEAD")]
        object: String,
    },
    #[command(name = "ls-tree", about = "List the contents of a tree object")]
    LsTree {
        #[arg(short, long, help = "Recurse into subtrees")]
        recursive: bool,
        #[arg(index = 1, help = "A tree or commit SHA, or HEAD")]
        object: String,
    },
    #[command(
        name = "commit-tree",
        about = "Snapshot a directory and commit it on a branch",
        long_about = "This command stores every file of a directory as blobs and trees, \
        creates a commit on top of the branch and moves the branch to it. \
        The author defaults to GIT_AUTHOR_NAME and GIT_AUTHOR_EMAIL."
    )]
    CommitTree {
        #[arg(index = 1, help = "The directory to snapshot (defaults to the repository root)")]
        directory: Option<String>,
        #[arg(short, long, help = "The author, as \"Name <email>\"")]
        author: Option<String>,
        #[arg(short, long, help = "The commit message")]
        message: String,
        #[arg(short, long, help = "The branch to commit on (defaults to the current branch)")]
        branch: Option<String>,
    },
    #[command(name = "pack-objects", about = "Write stored objects into a pack archive")]
    PackObjects {
        #[arg(index = 1, help = "The archive file to write")]
        output: String,
        #[arg(index = 2, help = "Objects to pack (defaults to every stored object)")]
        objects: Vec<String>,
    },
    #[command(name = "unpack-objects", about = "Store every object of a pack archive")]
    UnpackObjects {
        #[arg(index = 1, help = "The archive file to read")]
        input: String,
    },
    #[command(name = "push", about = "Send a branch to another repository")]
    Push {
        #[arg(index = 1, help = "Path of the destination repository")]
        destination: String,
        #[arg(index = 2, help = "The branch to push")]
        branch: String,
    },
    #[command(name = "pull", about = "Receive a branch from another repository")]
    Pull {
        #[arg(index = 1, help = "Path of the source repository")]
        source: String,
        #[arg(index = 2, help = "The branch to pull")]
        branch: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BIT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_repository() -> Result<Repository> {
    let pwd = std::env::current_dir()?;
    let repository = Repository::new(&pwd.to_string_lossy(), Box::new(std::io::stdout()))?;

    if !repository.is_initialized() {
        anyhow::bail!("not a repository: {}", pwd.display());
    }

    Ok(repository)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Init { path } => {
            let mut repository = match path {
                Some(path) => Repository::new(path, Box::new(std::io::stdout()))?,
                None => {
                    let pwd = std::env::current_dir()?;
                    Repository::new(&pwd.to_string_lossy(), Box::new(std::io::stdout()))?
                }
            };

            repository.init()?
        }
        Commands::HashObject { write, file } => {
            let mut repository = open_repository()?;
            repository.hash_object(file, *write)?
        }
        Commands::CatFile {
            pretty: _,
            kind,
            size,
            object,
        } => {
            let mode = if *kind {
                CatFileMode::Type
            } else if *size {
                CatFileMode::Size
            } else {
                CatFileMode::Pretty
            };

            let mut repository = open_repository()?;
            repository.cat_file(object, mode)?
        }
        Commands::LsTree { recursive, object } => {
            let mut repository = open_repository()?;
            repository.ls_tree(object, *recursive)?
        }
        Commands::CommitTree {
            directory,
            author,
            message,
            branch,
        } => {
            let mut repository = open_repository()?;
            repository.commit_tree(
                directory.as_deref(),
                author.as_deref(),
                message,
                branch.as_deref(),
            )?;
        }
        Commands::PackObjects { output, objects } => {
            let mut repository = open_repository()?;
            repository.pack_objects(output, objects)?
        }
        Commands::UnpackObjects { input } => {
            let mut repository = open_repository()?;
            repository.unpack_objects(input)?
        }
        Commands::Push {
            destination,
            branch,
        } => {
            let mut repository = open_repository()?;
            repository.push(destination, branch)?
        }
        Commands::Pull { source, branch } => {
            let mut repository = open_repository()?;
            repository.pull(source, branch)?
        }
    }

    Ok(())
}
