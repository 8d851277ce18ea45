use crate::common::file::{FileSpec, write_file};
use crate::common::redirect_temp_dir;
use assert_cmd::Command;
use assert_fs::TempDir;
use derive_new::new;
use rstest::fixture;
use std::path::Path;

pub const AUTHOR_NAME: &str = "fake_user";
pub const AUTHOR_EMAIL: &str = "fake_email@email.com";
pub const AUTHOR_DATE: &str = "2023-01-01 12:00:00 +0000";

#[fixture]
pub fn repository_dir() -> TempDir {
    redirect_temp_dir();
    TempDir::new().expect("Failed to create temp dir")
}

#[fixture]
pub fn init_repository_dir(repository_dir: TempDir) -> TempDir {
    run_bit_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    let file1 = FileSpec::new(repository_dir.path().join("1.txt"), "one".to_string());
    write_file(file1);

    let file2 = FileSpec::new(
        repository_dir.path().join("a").join("2.txt"),
        "two".to_string(),
    );
    write_file(file2);

    let file3 = FileSpec::new(
        repository_dir.path().join("a").join("b").join("3.txt"),
        "three".to_string(),
    );
    write_file(file3);

    bit_commit(repository_dir.path(), "Initial commit")
        .assert()
        .success();

    repository_dir
}

/// A second, empty repository to push to or pull into
#[fixture]
pub fn remote_repository_dir() -> TempDir {
    redirect_temp_dir();
    let dir = TempDir::new().expect("Failed to create temp dir");

    run_bit_command(dir.path(), &["init"]).assert().success();

    dir
}

pub fn run_bit_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("bitpack").expect("Failed to find bitpack binary");
    cmd.envs(vec![("BIT_LOG", "off")]);
    cmd.current_dir(dir);
    for arg in args {
        cmd.arg(arg);
    }
    cmd
}

pub fn bit_commit(dir: &Path, message: &str) -> Command {
    let mut cmd = run_bit_command(dir, &["commit-tree", "-m", message]);
    cmd.envs(vec![
        ("GIT_AUTHOR_NAME", AUTHOR_NAME),
        ("GIT_AUTHOR_EMAIL", AUTHOR_EMAIL),
        ("GIT_AUTHOR_DATE", AUTHOR_DATE), // %Y-%m-%d %H:%M:%S %z
    ]);
    cmd
}

/// Commit as a randomly generated author
pub fn bit_commit_as_random_author(dir: &Path, message: &str) -> Command {
    let author = generate_random_author();

    let mut cmd = run_bit_command(
        dir,
        &[
            "commit-tree",
            "--author",
            &format!("{} <{}>", author.name, author.email),
            "-m",
            message,
        ],
    );
    cmd.envs(vec![("GIT_AUTHOR_DATE", AUTHOR_DATE)]);
    cmd
}

#[derive(Debug, Clone, new)]
struct RandomAuthor {
    name: String,
    email: String,
}

fn generate_random_author() -> RandomAuthor {
    use fake::Fake;
    use fake::faker::internet::en::FreeEmail;
    use fake::faker::name::en::Name;

    let name = Name().fake::<String>().replace(" ", "_");
    let email = FreeEmail().fake::<String>();
    RandomAuthor::new(name, email)
}

/// Get the current HEAD commit SHA
pub fn get_head_commit_sha(dir: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let head_path = dir.join(".git").join("HEAD");
    let head_content = std::fs::read_to_string(head_path)?;

    // HEAD file contains either a commit SHA or a ref like "ref: refs/heads/main"
    if let Some(ref_path) = head_content.strip_prefix("ref: ") {
        let ref_file = dir.join(".git").join(ref_path.trim());
        let commit_sha = std::fs::read_to_string(ref_file)?;
        Ok(commit_sha.trim().to_string())
    } else {
        Ok(head_content.trim().to_string())
    }
}

/// Every loose object identity of a repository, sorted
pub fn list_object_ids(dir: &Path) -> Vec<String> {
    let objects_dir = dir.join(".git").join("objects");
    let mut object_ids = Vec::new();

    for shard in std::fs::read_dir(&objects_dir).expect("Failed to list objects") {
        let shard = shard.expect("Failed to read shard");
        let shard_name = shard.file_name().to_string_lossy().to_string();

        for object in std::fs::read_dir(shard.path()).expect("Failed to list shard") {
            let object = object.expect("Failed to read object");
            object_ids.push(format!(
                "{}{}",
                shard_name,
                object.file_name().to_string_lossy()
            ));
        }
    }

    object_ids.sort();
    object_ids
}

/// Read a field of `cat-file -p` for a commit, e.g. `parent` or `tree`
pub fn get_commit_field(
    dir: &Path,
    commit_id: &str,
    field: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let output = run_bit_command(dir, &["cat-file", "-p", commit_id]).output()?;
    let stdout = String::from_utf8(output.stdout)?;

    Ok(stdout
        .lines()
        .take_while(|line| !line.is_empty())
        .find_map(|line| line.strip_prefix(&format!("{field} ")).map(str::to_string)))
}
