//! Integration tests for the `folder-copier` binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn copier_cmd(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("folder-copier").expect("Failed to find folder-copier binary");
    cmd.arg("--config").arg(config).env("RUST_LOG", "warn");
    cmd
}

fn make_source(root: &Path) -> std::path::PathBuf {
    let src = root.join("a");
    fs::create_dir_all(src.join("sub")).unwrap();
    fs::write(src.join("x.txt"), "hi").unwrap();
    fs::write(src.join("sub").join("y.txt"), "yo").unwrap();
    src
}

#[test]
fn test_help() {
    let temp = tempdir().unwrap();
    copier_cmd(&temp.path().join("settings.json"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("copy"))
        .stdout(predicate::str::contains("settings"));
}

#[test]
fn test_copy_success_keeps_old_backup() {
    let temp = tempdir().unwrap();
    let src = make_source(temp.path());
    let dst = temp.path().join("b");
    fs::create_dir(&dst).unwrap();
    fs::write(dst.join("old.txt"), "previous").unwrap();

    copier_cmd(&temp.path().join("settings.json"))
        .arg("copy")
        .arg("--src")
        .arg(&src)
        .arg("--dst")
        .arg(&dst)
        .assert()
        .success()
        .stderr(predicate::str::contains("Copy complete!"));

    assert_eq!(fs::read_to_string(dst.join("sub").join("y.txt")).unwrap(), "yo");
    assert!(!dst.join("old.txt").exists());
    assert_eq!(
        fs::read_to_string(temp.path().join("b_old").join("old.txt")).unwrap(),
        "previous"
    );
}

#[test]
fn test_copy_json_output() {
    let temp = tempdir().unwrap();
    let src = make_source(temp.path());
    let dst = temp.path().join("b");

    copier_cmd(&temp.path().join("settings.json"))
        .args(["copy", "--json", "--verify", "sha256"])
        .arg("--src")
        .arg(&src)
        .arg("--dst")
        .arg(&dst)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Progress\""))
        .stdout(predicate::str::contains("\"Finished\""))
        .stdout(predicate::str::contains("\"files_copied\":2"));
}

#[test]
fn test_copy_missing_source_fails_cleanly() {
    let temp = tempdir().unwrap();
    let dst = temp.path().join("b");
    fs::create_dir(&dst).unwrap();
    fs::write(dst.join("keep.txt"), "keep").unwrap();

    copier_cmd(&temp.path().join("settings.json"))
        .arg("copy")
        .arg("--src")
        .arg(temp.path().join("missing"))
        .arg("--dst")
        .arg(&dst)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("source not found"));

    assert_eq!(fs::read_to_string(dst.join("keep.txt")).unwrap(), "keep");
    assert!(!temp.path().join("b_old").exists());
}

#[test]
fn test_copy_without_paths_is_usage_error() {
    let temp = tempdir().unwrap();
    copier_cmd(&temp.path().join("settings.json"))
        .arg("copy")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no source path"));
}

#[test]
fn test_check_reports_sizes() {
    let temp = tempdir().unwrap();
    let src = make_source(temp.path());

    copier_cmd(&temp.path().join("settings.json"))
        .arg("check")
        .arg("--src")
        .arg(&src)
        .arg("--dst")
        .arg(temp.path().join("b"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Files: 2"))
        .stdout(predicate::str::contains("Ready to copy"));

    assert!(!temp.path().join("b").exists());
}

#[test]
fn test_check_rejects_nested_destination() {
    let temp = tempdir().unwrap();
    let src = make_source(temp.path());

    copier_cmd(&temp.path().join("settings.json"))
        .arg("check")
        .arg("--src")
        .arg(&src)
        .arg("--dst")
        .arg(src.join("inner"))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Not ready"));
}

#[test]
fn test_settings_password_and_set_flow() {
    let temp = tempdir().unwrap();
    let config = temp.path().join("settings.json");
    let src = make_source(temp.path());

    copier_cmd(&config)
        .args(["settings", "password", "--new", "s3cret"])
        .assert()
        .success();

    copier_cmd(&config)
        .args(["settings", "set", "--password", "wrong", "--destination", "/x"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("incorrect password"));

    copier_cmd(&config)
        .args(["settings", "set", "--password", "s3cret", "--source"])
        .arg(&src)
        .args(["--destination"])
        .arg(temp.path().join("b"))
        .assert()
        .success();

    copier_cmd(&config)
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("destination_path"))
        .stdout(predicate::str::contains("password_hash").not())
        .stderr(predicate::str::contains("Password: set"));

    // Paths now come from the stored settings
    copier_cmd(&config).arg("copy").assert().success();
    assert!(temp.path().join("b").join("x.txt").exists());
}

#[test]
fn test_settings_export_import() {
    let temp = tempdir().unwrap();
    let config = temp.path().join("settings.json");
    let exported = temp.path().join("shared.json");

    copier_cmd(&config)
        .args(["settings", "password", "--new", "pw"])
        .assert()
        .success();
    copier_cmd(&config)
        .args(["settings", "export"])
        .arg(&exported)
        .assert()
        .success();

    let text = fs::read_to_string(&exported).unwrap();
    assert!(!text.contains("password_hash"));

    copier_cmd(&config)
        .args(["settings", "import"])
        .arg(&exported)
        .args(["--password", "pw"])
        .assert()
        .success();

    // The password survives an import that carries none
    copier_cmd(&config)
        .args(["settings", "password", "--new", "pw2", "--current", "pw"])
        .assert()
        .success();
}

#[test]
fn test_settings_reset_keeps_password() {
    let temp = tempdir().unwrap();
    let config = temp.path().join("settings.json");

    copier_cmd(&config)
        .args(["settings", "password", "--new", "pw"])
        .assert()
        .success();
    copier_cmd(&config)
        .args(["settings", "set", "--password", "pw", "--destination", "/mnt/out"])
        .assert()
        .success();

    copier_cmd(&config)
        .args(["settings", "reset", "--password", "wrong"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("incorrect password"));

    copier_cmd(&config)
        .args(["settings", "reset", "--password", "pw"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Settings reset"));

    copier_cmd(&config)
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/mnt/out").not())
        .stderr(predicate::str::contains("Password: set"));
}

#[test]
fn test_network_unreachable_host() {
    let temp = tempdir().unwrap();
    copier_cmd(&temp.path().join("settings.json"))
        .args(["network", "--host", ""])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("is not reachable"));
}

#[test]
fn test_log_file_records_the_run() {
    let temp = tempdir().unwrap();
    let src = make_source(temp.path());
    let log = temp.path().join("logs").join("copier.log");

    copier_cmd(&temp.path().join("settings.json"))
        .arg("--log-file")
        .arg(&log)
        .arg("copy")
        .arg("--src")
        .arg(&src)
        .arg("--dst")
        .arg(temp.path().join("b"))
        .assert()
        .success();

    let text = fs::read_to_string(&log).unwrap();
    assert!(!text.is_empty());
    assert!(!text.contains('\u{1b}'));
}
