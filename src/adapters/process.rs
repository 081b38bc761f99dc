use crate::config::Settings;
use crate::core::{BindAddress, Candidate, CandidateLauncher, ProcessExit};
use crate::utils::error::{Result, UpdateError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

// 新舊版本之間的啟動參數約定，修改時需保持相容
pub const TAKEOVER_FLAG: &str = "takeover";
pub const TEMP_BIND_FLAG: &str = "temp-bind";
pub const BIND_FLAG: &str = "bind";
pub const UPGRADE_DIR_FLAG: &str = "upgrade-dir";
pub const PROBE_TIMEOUT_FLAG: &str = "probe-timeout-seconds";
pub const PROBE_CONCURRENCY_FLAG: &str = "probe-concurrency";
pub const STARTUP_TIMEOUT_FLAG: &str = "startup-timeout-seconds";
pub const HANDOFF_TIMEOUT_FLAG: &str = "handoff-timeout-seconds";
pub const SHUTDOWN_TIMEOUT_FLAG: &str = "shutdown-timeout-seconds";
pub const JSON_LOGS_FLAG: &str = "json-logs";
pub const VERBOSE_FLAG: &str = "verbose";

/// Resolved settings handed down to the candidate, so the next instance runs
/// with the same configuration as this one.
#[derive(Debug, Clone)]
pub struct TakeoverOptions {
    pub upgrade_dir: PathBuf,
    pub probe_timeout: Duration,
    pub probe_concurrency: usize,
    pub startup_timeout: Duration,
    pub handoff_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub json_logs: bool,
    pub verbose: bool,
}

impl TakeoverOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            upgrade_dir: settings.upgrade_dir.clone(),
            probe_timeout: settings.probe_timeout,
            probe_concurrency: settings.probe_concurrency,
            startup_timeout: settings.startup_timeout,
            handoff_timeout: settings.handoff_timeout,
            shutdown_timeout: settings.shutdown_timeout,
            json_logs: false,
            verbose: false,
        }
    }

    pub fn with_logging(mut self, json_logs: bool, verbose: bool) -> Self {
        self.json_logs = json_logs;
        self.verbose = verbose;
        self
    }
}

pub fn takeover_args(temp_bind: &BindAddress, bind: &BindAddress, options: &TakeoverOptions) -> Vec<String> {
    let flag = |name: &str| format!("--{}", name);

    let mut args = vec![
        flag(TAKEOVER_FLAG),
        flag(TEMP_BIND_FLAG),
        temp_bind.to_string(),
        flag(BIND_FLAG),
        bind.to_string(),
        flag(UPGRADE_DIR_FLAG),
        options.upgrade_dir.to_string_lossy().to_string(),
        flag(PROBE_TIMEOUT_FLAG),
        options.probe_timeout.as_secs().to_string(),
        flag(PROBE_CONCURRENCY_FLAG),
        options.probe_concurrency.to_string(),
        flag(STARTUP_TIMEOUT_FLAG),
        options.startup_timeout.as_secs().to_string(),
        flag(HANDOFF_TIMEOUT_FLAG),
        options.handoff_timeout.as_secs().to_string(),
        flag(SHUTDOWN_TIMEOUT_FLAG),
        options.shutdown_timeout.as_secs().to_string(),
    ];
    if options.json_logs {
        args.push(flag(JSON_LOGS_FLAG));
    }
    if options.verbose {
        args.push(flag(VERBOSE_FLAG));
    }
    args
}

/// Starts the candidate as a detached child that outlives this process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    options: TakeoverOptions,
}

impl ProcessLauncher {
    pub fn new(options: TakeoverOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl CandidateLauncher for ProcessLauncher {
    async fn launch(
        &self,
        candidate: &Candidate,
        temp_bind: &BindAddress,
        bind: &BindAddress,
    ) -> Result<Option<u32>> {
        let args = takeover_args(temp_bind, bind, &self.options);
        tracing::debug!("exec {} {}", candidate.path.display(), args.join(" "));

        let child = Command::new(&candidate.path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| UpdateError::SpawnError {
                path: candidate.path.clone(),
                source,
            })?;

        Ok(child.id())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdExit;

impl ProcessExit for StdExit {
    fn exit(&self, code: i32) {
        std::process::exit(code)
    }
}
