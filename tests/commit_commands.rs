use assert_fs::TempDir;
use common::command::{
    bit_commit, bit_commit_as_random_author, get_commit_field, get_head_commit_sha,
    init_repository_dir, repository_dir, run_bit_command,
};
use common::file::{FileSpec, create_directory, write_file, write_generated_files};
use predicates::prelude::predicate;
use pretty_assertions::assert_eq;
use rstest::rstest;

mod common;

#[rstest]
fn root_commit_is_announced(repository_dir: TempDir) -> Result<(), Box<dyn std::error::Error>> {
    run_bit_command(repository_dir.path(), &["init"])
        .assert()
        .success();
    write_generated_files(repository_dir.path(), 3);

    bit_commit(repository_dir.path(), "Initial commit")
        .assert()
        .success()
        .stdout(predicate::str::is_match(
            r"^\[\(root-commit\) [0-9a-f]{7}\] Initial commit\n$",
        )?);

    let head = get_head_commit_sha(repository_dir.path())?;
    assert_eq!(get_commit_field(repository_dir.path(), &head, "parent")?, None);
    assert_eq!(
        std::fs::read_to_string(repository_dir.path().join(".git/HEAD"))?,
        "ref: refs/heads/master\n"
    );

    Ok(())
}

#[rstest]
fn second_commit_points_at_the_first(
    init_repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    let first = get_head_commit_sha(init_repository_dir.path())?;

    write_file(FileSpec::new(
        init_repository_dir.path().join("4.txt"),
        "four".to_string(),
    ));
    bit_commit_as_random_author(init_repository_dir.path(), "Second commit")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^\[[0-9a-f]{7}\] Second commit\n$")?);

    let second = get_head_commit_sha(init_repository_dir.path())?;
    assert_ne!(first, second);
    assert_eq!(
        get_commit_field(init_repository_dir.path(), &second, "parent")?,
        Some(first)
    );

    Ok(())
}

#[rstest]
fn nested_directories_become_nested_trees(
    init_repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    run_bit_command(init_repository_dir.path(), &["ls-tree", "HEAD"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(
            r"^100644 blob [0-9a-f]{40}\t1\.txt\n040000 tree [0-9a-f]{40}\ta\n$",
        )?);

    run_bit_command(init_repository_dir.path(), &["ls-tree", "-r", "HEAD"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(
            r"^100644 blob [0-9a-f]{40}\t1\.txt\n100644 blob [0-9a-f]{40}\ta/2\.txt\n100644 blob [0-9a-f]{40}\ta/b/3\.txt\n$",
        )?);

    Ok(())
}

#[rstest]
fn pretty_printed_tree_lists_its_entries(
    init_repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    let head = get_head_commit_sha(init_repository_dir.path())?;
    let tree = get_commit_field(init_repository_dir.path(), &head, "tree")?
        .ok_or("commit has no tree")?;

    run_bit_command(init_repository_dir.path(), &["cat-file", "-p", &tree])
        .assert()
        .success()
        .stdout(predicate::str::is_match(
            r"^100644 blob [0-9a-f]{40}\t1\.txt\n040000 tree [0-9a-f]{40}\ta\n$",
        )?);
    run_bit_command(init_repository_dir.path(), &["cat-file", "-t", &tree])
        .assert()
        .success()
        .stdout(predicate::eq("tree\n"));

    Ok(())
}

#[rstest]
fn empty_directories_are_left_out() -> Result<(), Box<dyn std::error::Error>> {
    common::redirect_temp_dir();
    let with_empty = TempDir::new()?;
    let without_empty = TempDir::new()?;

    for dir in [&with_empty, &without_empty] {
        run_bit_command(dir.path(), &["init"]).assert().success();
        write_file(FileSpec::new(dir.path().join("file.txt"), "same".to_string()));
    }
    create_directory(&with_empty.path().join("nothing").join("here"));

    for dir in [&with_empty, &without_empty] {
        bit_commit(dir.path(), "snapshot").assert().success();
    }

    assert_eq!(
        get_head_commit_sha(with_empty.path())?,
        get_head_commit_sha(without_empty.path())?
    );

    Ok(())
}

#[cfg(unix)]
#[rstest]
fn symlinked_directory_cycle_is_skipped(
    init_repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = init_repository_dir.path();
    std::os::unix::fs::symlink(dir.join("a"), dir.join("a").join("b").join("up"))?;
    std::os::unix::fs::symlink(dir.join("1.txt"), dir.join("link.txt"))?;

    bit_commit(dir, "with links").assert().success();

    run_bit_command(dir, &["ls-tree", "-r", "HEAD"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(
            r"^100644 blob [0-9a-f]{40}\t1\.txt\n100644 blob [0-9a-f]{40}\ta/2\.txt\n100644 blob [0-9a-f]{40}\ta/b/3\.txt\n$",
        )?);

    Ok(())
}

#[rstest]
fn identical_directories_hash_identically() -> Result<(), Box<dyn std::error::Error>> {
    common::redirect_temp_dir();
    let first = TempDir::new()?;
    let second = TempDir::new()?;

    for dir in [&first, &second] {
        run_bit_command(dir.path(), &["init"]).assert().success();
        write_file(FileSpec::new(dir.path().join("b.txt"), "bee".to_string()));
        write_file(FileSpec::new(dir.path().join("a").join("x.txt"), "ex".to_string()));
        write_file(FileSpec::new(dir.path().join("a.txt"), "ay".to_string()));
        bit_commit(dir.path(), "same snapshot").assert().success();
    }

    let first_head = get_head_commit_sha(first.path())?;
    let second_head = get_head_commit_sha(second.path())?;
    assert_eq!(first_head, second_head);
    assert_eq!(
        get_commit_field(first.path(), &first_head, "tree")?,
        get_commit_field(second.path(), &second_head, "tree")?
    );

    Ok(())
}

#[rstest]
fn empty_root_commits_the_empty_tree(
    repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    run_bit_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    bit_commit(repository_dir.path(), "nothing yet")
        .assert()
        .success();

    let head = get_head_commit_sha(repository_dir.path())?;
    assert_eq!(
        get_commit_field(repository_dir.path(), &head, "tree")?,
        Some("4b825dc642cb6eb9a060e54bf8d69288fbee4904".to_string())
    );

    Ok(())
}

#[rstest]
fn commit_on_named_branch_and_subdirectory(
    init_repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    run_bit_command(
        init_repository_dir.path(),
        &[
            "commit-tree",
            "a",
            "--author",
            "Your Name <you@host>",
            "-m",
            "only a",
            "--branch",
            "feature/a",
        ],
    )
    .env("GIT_AUTHOR_DATE", "2023-01-01 12:00:00 +0000")
    .assert()
    .success()
    .stdout(predicate::str::contains("(root-commit)"));

    assert_eq!(
        std::fs::read_to_string(init_repository_dir.path().join(".git/HEAD"))?,
        "ref: refs/heads/feature/a\n"
    );
    assert!(init_repository_dir.path().join(".git/refs/heads/master").is_file());

    run_bit_command(init_repository_dir.path(), &["ls-tree", "HEAD"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(
            r"^100644 blob [0-9a-f]{40}\t2\.txt\n040000 tree [0-9a-f]{40}\tb\n$",
        )?);

    let head = get_head_commit_sha(init_repository_dir.path())?;
    run_bit_command(init_repository_dir.path(), &["cat-file", "-p", &head])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "author Your Name <you@host> 1672574400 +0000\n",
        ));

    Ok(())
}

#[rstest]
fn commit_without_author_fails_and_keeps_refs(
    repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    run_bit_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    run_bit_command(repository_dir.path(), &["commit-tree", "-m", "anonymous"])
        .env_remove("GIT_AUTHOR_NAME")
        .env_remove("GIT_AUTHOR_EMAIL")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GIT_AUTHOR_NAME"));

    assert!(!repository_dir.path().join(".git/refs/heads/master").exists());

    Ok(())
}
