use crate::core::{Version, VersionProbe};
use crate::utils::error::{Result, UpdateError};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Flag every build of the service answers with its bare version.
pub const VERSION_FLAG: &str = "--version";

/// Runs `<bin> --version` and parses its stdout.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for CommandProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl VersionProbe for CommandProbe {
    async fn probe(&self, path: &Path) -> Result<Version> {
        let failed = |reason: String| UpdateError::ProbeFailed {
            path: path.to_path_buf(),
            reason,
        };

        let child = Command::new(path)
            .arg(VERSION_FLAG)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed(format!("execute: {}", e)))?;

        // 逾時後 child 被 drop，kill_on_drop 會結束程序
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| failed(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| failed(format!("wait: {}", e)))?;

        if !output.status.success() {
            return Err(failed(format!("exited with {}", output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Version::parse(stdout.trim()).map_err(|e| failed(e.to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_probe_reads_version() {
        let dir = TempDir::new().unwrap();
        let bin = script(&dir, "svc", r#"[ "$1" = "--version" ] && echo "1.2.0""#);

        let version = CommandProbe::default().probe(&bin).await.unwrap();
        assert_eq!(version, Version::new(1, 2, 0));
    }

    #[tokio::test]
    async fn test_probe_rejects_garbage_and_failures() {
        let dir = TempDir::new().unwrap();
        let probe = CommandProbe::default();

        let garbage = script(&dir, "garbage", "echo hello world");
        assert!(matches!(
            probe.probe(&garbage).await,
            Err(UpdateError::ProbeFailed { .. })
        ));

        let failing = script(&dir, "failing", "echo 9.9.9; exit 1");
        assert!(probe.probe(&failing).await.is_err());

        assert!(probe.probe(&dir.path().join("missing")).await.is_err());
    }

    #[tokio::test]
    async fn test_probe_times_out() {
        let dir = TempDir::new().unwrap();
        let slow = script(&dir, "slow", "sleep 5; echo 2.0.0");

        let started = std::time::Instant::now();
        let result = CommandProbe::new(Duration::from_millis(200)).probe(&slow).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
