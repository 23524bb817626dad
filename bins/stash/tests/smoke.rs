use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command with its config dir pinned inside a temp dir, so runs never touch
/// the real user config.
fn stash(cfg: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("stash").unwrap();
    cmd.env("STASH_CONFIG_DIR", cfg.path());
    cmd
}

fn seed_archive(store: &std::path::Path, id: &str, meta: &str, bytes: &[u8]) {
    std::fs::create_dir_all(store).unwrap();
    std::fs::write(store.join(format!("{id}.bin")), bytes).unwrap();
    std::fs::write(store.join(format!("{id}.meta")), meta).unwrap();
}

#[test]
fn no_action_is_an_error() {
    let cfg = tempfile::tempdir().unwrap();
    stash(&cfg)
        .args(["--name", "site"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no action provided"));
}

#[test]
fn backup_then_list_shows_the_archive() {
    let cfg = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let file = work.path().join("data.tar");
    std::fs::write(&file, b"payload").unwrap();

    stash(&cfg)
        .args(["--name", "site"])
        .arg("--store")
        .arg(store.path())
        .arg("--backup")
        .arg(&file)
        .assert()
        .success();

    stash(&cfg)
        .args(["--name", "site", "--list"])
        .arg("--store")
        .arg(store.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(":\t"));
}

#[test]
fn prune_removes_expired_archives() {
    let cfg = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    seed_archive(
        store.path(),
        "deadbeef-0001",
        "site 2020-01-01T00:00:00.000Z 2020-01-08T00:00:00.000Z",
        b"old",
    );

    stash(&cfg)
        .args(["--name", "site", "--prune", "--list"])
        .arg("--store")
        .arg(store.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("deadbeef-0001").not());
}

#[test]
fn restore_writes_the_archive_to_disk() {
    let cfg = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    seed_archive(
        store.path(),
        "deadbeef-0002",
        "site 2024-01-01T00:00:00.000Z 2999-01-01T00:00:00.000Z",
        b"restored payload",
    );

    stash(&cfg)
        .args(["--name", "site", "--restore", "deadbeef-0002"])
        .arg("--store")
        .arg(store.path())
        .current_dir(work.path())
        .assert()
        .success();

    assert_eq!(
        std::fs::read(work.path().join("deadbeef-0002")).unwrap(),
        b"restored payload"
    );
}

#[test]
fn restore_of_unknown_id_fails() {
    let cfg = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    stash(&cfg)
        .args(["--name", "site", "--restore", "missing"])
        .arg("--store")
        .arg(store.path())
        .assert()
        .failure();
}

#[test]
fn bad_prune_concurrency_in_config_is_an_error() {
    let cfg = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    std::fs::write(
        cfg.path().join("config.toml"),
        "log_level = \"info\"\nprune_concurrency = 0\n",
    )
    .unwrap();

    stash(&cfg)
        .args(["--name", "site", "--list"])
        .arg("--store")
        .arg(store.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("prune_concurrency"));
}
