#![cfg(unix)]

use self_update::core::check::CandidateScanner;
use self_update::{newest_candidate, UpdateError, Version};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn write_script(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
    path
}

/// A fake build that answers `--version` like the real binary does.
fn fake_build(dir: &Path, name: &str, version: &str) -> PathBuf {
    write_script(
        dir,
        name,
        &format!(
            "if [ \"$1\" = \"--version\" ]; then echo \"{}\"; exit 0; fi\nexit 1",
            version
        ),
        0o755,
    )
}

async fn newest(dir: &Path, current: &str) -> self_update::Result<self_update::Candidate> {
    newest_candidate(dir, &Version::parse(current).unwrap(), Duration::from_secs(5), 4).await
}

#[tokio::test]
async fn test_selects_newest_of_several_builds() {
    let dir = TempDir::new().unwrap();
    fake_build(dir.path(), "svc-0.9.0", "0.9.0");
    fake_build(dir.path(), "svc-1.0.0", "1.0.0");
    let expected = fake_build(dir.path(), "svc-1.2.0", "1.2.0");
    fake_build(dir.path(), "svc-1.1.0", "1.1.0");

    let candidate = newest(dir.path(), "1.0.0").await.unwrap();
    assert_eq!(candidate.version, Version::new(1, 2, 0));
    assert_eq!(candidate.path, expected);
}

#[tokio::test]
async fn test_only_older_or_equal_builds() {
    let dir = TempDir::new().unwrap();
    fake_build(dir.path(), "svc-1.9.9", "1.9.9");
    fake_build(dir.path(), "svc-2.0.0", "2.0.0");

    let err = newest(dir.path(), "2.0.0").await.unwrap_err();
    assert!(err.is_no_candidate());
}

#[tokio::test]
async fn test_broken_binaries_do_not_abort_scan() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "garbage", "echo 'not a version at all'", 0o755);
    write_script(dir.path(), "crashes", "exit 3", 0o755);
    write_script(dir.path(), "not-executable", "echo 5.0.0", 0o644);
    std::fs::write(dir.path().join("notes.txt"), "release notes").unwrap();
    let expected = fake_build(dir.path(), "svc-1.3.0", "v1.3.0");

    let candidate = newest(dir.path(), "1.0.0").await.unwrap();
    assert_eq!(candidate.path, expected);
    assert_eq!(candidate.version.to_string(), "1.3.0");
}

#[tokio::test]
async fn test_hanging_binary_is_skipped() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "hangs", "sleep 10", 0o755);
    let expected = fake_build(dir.path(), "svc-1.1.0", "1.1.0");

    let scanner = CandidateScanner::with_timeout(Duration::from_millis(300), 2);
    let candidate = scanner
        .newest(dir.path(), &Version::parse("1.0.0").unwrap())
        .await
        .unwrap();
    assert_eq!(candidate.path, expected);
}

#[tokio::test]
async fn test_empty_and_missing_directories() {
    let dir = TempDir::new().unwrap();
    assert!(newest(dir.path(), "1.0.0").await.unwrap_err().is_no_candidate());
    assert!(newest(&dir.path().join("missing"), "1.0.0")
        .await
        .unwrap_err()
        .is_no_candidate());
}

#[tokio::test]
async fn test_repeated_scans_agree() {
    let dir = TempDir::new().unwrap();
    fake_build(dir.path(), "b-1.5.0", "1.5.0");
    fake_build(dir.path(), "a-1.5.0", "1.5.0");

    let first = newest(dir.path(), "1.0.0").await.unwrap();
    let second = newest(dir.path(), "1.0.0").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.path, dir.path().join("b-1.5.0"));
}

#[tokio::test]
async fn test_unreadable_directory_is_discovery_error() {
    let dir = TempDir::new().unwrap();
    let locked = dir.path().join("locked");
    std::fs::create_dir(&locked).unwrap();
    fake_build(&locked, "svc-2.0.0", "2.0.0");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

    // root 不受權限限制
    if std::fs::read_dir(&locked).is_ok() {
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let err = newest(&locked, "1.0.0").await.unwrap_err();
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

    assert!(matches!(err, UpdateError::DiscoveryError { .. }));
    assert!(!err.is_no_candidate());
}
