use crate::domain::model::{BindAddress, Candidate, Version};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Asks an executable for its self-reported version.
#[async_trait]
pub trait VersionProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<Version>;
}

/// Starts a candidate binary in takeover mode.
#[async_trait]
pub trait CandidateLauncher: Send + Sync {
    /// Returns the child's pid when the platform reports one.
    async fn launch(
        &self,
        candidate: &Candidate,
        temp_bind: &BindAddress,
        bind: &BindAddress,
    ) -> Result<Option<u32>>;
}

/// The listener currently serving the permanent address.
#[async_trait]
pub trait Listener: Send {
    /// Stops accepting connections and drains in-flight requests.
    async fn shutdown(&mut self, timeout: Duration) -> Result<()>;
}

pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

pub trait ConfigProvider: Send + Sync {
    fn bind(&self) -> &BindAddress;
    fn temp_bind(&self) -> &BindAddress;
    fn upgrade_dir(&self) -> &PathBuf;
    fn probe_timeout(&self) -> Duration;
    fn probe_concurrency(&self) -> usize;
    fn startup_timeout(&self) -> Duration;
    fn handoff_timeout(&self) -> Duration;
    fn shutdown_timeout(&self) -> Duration;
}

#[async_trait]
impl<T: CandidateLauncher + ?Sized> CandidateLauncher for Box<T> {
    async fn launch(
        &self,
        candidate: &Candidate,
        temp_bind: &BindAddress,
        bind: &BindAddress,
    ) -> Result<Option<u32>> {
        (**self).launch(candidate, temp_bind, bind).await
    }
}

impl<T: ProcessExit + ?Sized> ProcessExit for Box<T> {
    fn exit(&self, code: i32) {
        (**self).exit(code)
    }
}
