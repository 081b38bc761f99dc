use crate::core::probe::CommandProbe;
use crate::core::{Candidate, Version, VersionProbe};
use crate::utils::error::{Result, UpdateError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Picks the newest binary that is strictly newer than `current`.
///
/// Equal versions are ordered by path, so the lexically greatest path wins a tie.
pub fn rank(current: &Version, probed: Vec<(PathBuf, Version)>) -> Result<Candidate> {
    let mut newer: Vec<Candidate> = probed
        .into_iter()
        .filter(|(_, version)| version.is_newer_than(current))
        .map(|(path, version)| Candidate::new(path, version))
        .collect();

    newer.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.path.cmp(&b.path)));

    newer.pop().ok_or(UpdateError::NoCandidate)
}

pub struct CandidateScanner<P: VersionProbe> {
    probe: Arc<P>,
    concurrency: usize,
}

impl CandidateScanner<CommandProbe> {
    pub fn with_timeout(timeout: Duration, concurrency: usize) -> Self {
        Self::new(CommandProbe::new(timeout), concurrency)
    }
}

impl<P: VersionProbe + 'static> CandidateScanner<P> {
    pub fn new(probe: P, concurrency: usize) -> Self {
        Self {
            probe: Arc::new(probe),
            concurrency: concurrency.max(1),
        }
    }

    /// Probes every executable file directly inside `dir`.
    ///
    /// A missing directory scans as empty. Binaries that fail to probe are skipped.
    pub async fn scan(&self, dir: &Path) -> Result<Vec<(PathBuf, Version)>> {
        let paths = match list_executables(dir) {
            Ok(paths) => paths,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("upgrade directory {} does not exist", dir.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(UpdateError::DiscoveryError {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut probes = JoinSet::new();

        for path in paths {
            let probe = Arc::clone(&self.probe);
            let semaphore = Arc::clone(&semaphore);
            probes.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                tracing::debug!("check version of {}", path.display());
                let result = probe.probe(&path).await;
                (path, result)
            });
        }

        // 等待所有探測完成後才排序
        let mut probed = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((path, Ok(version))) => {
                    tracing::debug!("{} reports version {}", path.display(), version);
                    probed.push((path, version));
                }
                Ok((path, Err(e))) => {
                    tracing::debug!("skip {}: {}", path.display(), e);
                }
                Err(e) => {
                    tracing::warn!("version probe task failed: {}", e);
                }
            }
        }

        Ok(probed)
    }

    pub async fn newest(&self, dir: &Path, current: &Version) -> Result<Candidate> {
        let probed = self.scan(dir).await?;
        if probed.is_empty() {
            return Err(UpdateError::NoCandidate);
        }
        rank(current, probed)
    }
}

fn list_executables(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        // 跟隨符號連結
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!("skip {}: {}", path.display(), e);
                continue;
            }
        };
        if metadata.is_file() && is_executable(&metadata) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

/// Returns the newest binary in `dir` that is newer than `current`.
///
/// 1. Execute `<bin> --version` on every executable in `dir`
/// 2. Return the binary with the latest version
pub async fn newest_candidate(
    dir: &Path,
    current: &Version,
    probe_timeout: Duration,
    concurrency: usize,
) -> Result<Candidate> {
    CandidateScanner::with_timeout(probe_timeout, concurrency)
        .newest(dir, current)
        .await
}

/// Same as [`newest_candidate`] with the current version given as a string.
pub async fn newest_candidate_str(dir: &Path, current: &str) -> Result<Candidate> {
    let current = Version::parse(current)?;
    newest_candidate(dir, &current, Duration::from_secs(5), 4).await
}
