//! Integration tests for the `vmcore-report` binary

use super::common::{fake_vmcore, read};
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("vmcore-report").expect("binary should be built");
    cmd.arg("--config")
        .arg(dir.join("no-such-config.toml"))
        .env_remove("RUST_LOG");
    cmd
}

fn single_entry(dir: &Path, prefix: &str, suffix: &str) -> PathBuf {
    let entries: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix) && n.ends_with(suffix))
        })
        .collect();
    assert_eq!(entries.len(), 1, "expected one {prefix}* in {}: {entries:?}", dir.display());
    entries.into_iter().next().unwrap()
}

#[test]
fn test_list_plugins_needs_no_vmcore() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .arg("--list-plugins")
        .assert()
        .success()
        .stdout(predicate::str::contains("kernel_info"))
        .stdout(predicate::str::contains("vmcore_procfs"))
        .stdout(predicate::str::contains("sched_debug").not());
}

#[test]
fn test_missing_vmcore_flag_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--vmcore"));
}

#[test]
fn test_nonexistent_vmcore_exits_1() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .args(["--batch", "--tmp-dir"])
        .arg(dir.path())
        .arg("--vmcore")
        .arg(dir.path().join("vmcore"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("vmcore not found"));
}

#[test]
fn test_invalid_config_exits_1() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "compression = \"lzma\"\n").unwrap();
    let vmcore = fake_vmcore(dir.path());

    Command::cargo_bin("vmcore-report")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("--vmcore")
        .arg(&vmcore)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid config"));
}

#[test]
fn test_build_run_produces_tree() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let vmcore = fake_vmcore(input.path());

    cmd(input.path())
        .arg("--vmcore")
        .arg(&vmcore)
        .arg("--tmp-dir")
        .arg(out.path())
        .args(["--build", "--batch", "--quiet", "--label", "ci"])
        .assert()
        .success();

    let root = single_entry(out.path(), "vmcore-report-ci-", "");
    assert!(root.is_dir());
    for dir in ["proc", "sys", "sos_commands", "plugins", "sos_logs", "sos_reports"] {
        assert!(root.join(dir).is_dir(), "missing {dir}");
    }
    assert!(root.join("sos_logs/vmcore-report.log").is_file());

    let manifest: serde_json::Value =
        serde_json::from_str(&read(&root, "sos_reports/manifest.json")).unwrap();
    assert_eq!(manifest["session"]["backend"], "vmcoreinfo");
    assert_eq!(manifest["plugins"]["selected"].as_array().unwrap().len(), 4);
    assert_eq!(manifest["options"]["build"], true);

    // Nothing but the final tree is left in the output directory.
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 1);
}

#[test]
fn test_zip_run_writes_archive_and_checksum() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let vmcore = fake_vmcore(input.path());

    cmd(input.path())
        .arg("--vmcore")
        .arg(&vmcore)
        .arg("--tmp-dir")
        .arg(out.path())
        .args(["--batch", "-o", "kernel_info", "--compression-type", "stored"])
        .assert()
        .success()
        .stdout(predicate::str::contains("archive has been generated"));

    let zip = single_entry(out.path(), "vmcore-report-", ".zip");
    let sum_file = PathBuf::from(format!("{}.sha256", zip.display()));
    let files: Vec<_> = fs::read_dir(out.path()).unwrap().collect();
    assert_eq!(files.len(), 2);
    let digest = fs::read_to_string(sum_file).unwrap();
    assert_eq!(digest.trim_end().len(), 64);
}
