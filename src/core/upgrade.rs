use crate::core::{BindAddress, Candidate, CandidateLauncher, Listener, ProcessExit};
use crate::utils::error::{Result, UpdateError};
use reqwest::Client;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Route served by a candidate in takeover mode.
pub const HANDOFF_PATH: &str = "/replace";

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    Idle,
    Stopping,
    Spawning,
    AwaitingHandoff,
    HandoffConfirmed,
    Exiting,
    Failed,
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpgradeState::Idle => "idle",
            UpgradeState::Stopping => "stopping",
            UpgradeState::Spawning => "spawning",
            UpgradeState::AwaitingHandoff => "awaiting handoff",
            UpgradeState::HandoffConfirmed => "handoff confirmed",
            UpgradeState::Exiting => "exiting",
            UpgradeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct UpgradeTimeouts {
    pub shutdown: Duration,
    pub startup: Duration,
    pub handoff: Duration,
}

impl Default for UpgradeTimeouts {
    fn default() -> Self {
        Self {
            shutdown: Duration::from_secs(30),
            startup: Duration::from_secs(10),
            handoff: Duration::from_secs(10),
        }
    }
}

/// Replaces the running process with a candidate binary.
///
/// 1. Stops the listener
/// 2. Starts the candidate on the temporary bind
/// 3. Calls `GET /replace` on the candidate
/// 4. Exits
///
/// There is no rollback: once the listener is stopped a failed spawn or
/// handoff leaves the service down.
pub struct UpgradeOrchestrator<L: CandidateLauncher, E: ProcessExit> {
    launcher: L,
    exit: E,
    client: Client,
    timeouts: UpgradeTimeouts,
    state: Mutex<UpgradeState>,
    in_progress: AtomicBool,
}

struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<L: CandidateLauncher, E: ProcessExit> UpgradeOrchestrator<L, E> {
    pub fn new(launcher: L, exit: E, timeouts: UpgradeTimeouts) -> Self {
        Self {
            launcher,
            exit,
            // 交接對象是本機子程序，不經過代理
            client: Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| Client::new()),
            timeouts,
            state: Mutex::new(UpgradeState::Idle),
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> UpgradeState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(UpgradeState::Failed)
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    fn transition(&self, next: UpgradeState) {
        if let Ok(mut state) = self.state.lock() {
            tracing::debug!("upgrade state: {} -> {}", *state, next);
            *state = next;
        }
    }

    fn fail(&self, stage: UpgradeState, err: UpdateError) -> UpdateError {
        tracing::error!(
            "❌ upgrade failed while {}: {} (Category: {:?}, Severity: {:?})",
            stage,
            err,
            err.category(),
            err.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", err.recovery_suggestion());
        self.transition(UpgradeState::Failed);
        err
    }

    /// Runs one upgrade attempt. On success the process exits with status 0
    /// and this never returns in production.
    pub async fn upgrade(
        &self,
        candidate: &Candidate,
        listener: &mut dyn Listener,
        temp_bind: &BindAddress,
        bind: &BindAddress,
    ) -> Result<()> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(UpdateError::UpgradeInProgress);
        }
        let _guard = InProgress(&self.in_progress);

        if temp_bind.lookup_conflicts_with(bind).await {
            return Err(UpdateError::InvalidBind {
                bind: temp_bind.to_string(),
                reason: format!("temporary bind overlaps the permanent bind {}", bind),
            });
        }
        let mut url = temp_bind.to_url()?;
        url.set_path(HANDOFF_PATH);

        tracing::info!("🚀 upgrading to {}", candidate);

        self.transition(UpgradeState::Stopping);
        if let Err(e) = listener.shutdown(self.timeouts.shutdown).await {
            // 無法乾淨釋放監聽，不可繼續服務
            let err = self.fail(UpgradeState::Stopping, e);
            self.exit.exit(1);
            return Err(err);
        }
        tracing::info!("listener on {} stopped", bind);

        self.transition(UpgradeState::Spawning);
        match self.launcher.launch(candidate, temp_bind, bind).await {
            Ok(pid) => tracing::info!(
                "started {} on {} (pid {})",
                candidate.path.display(),
                temp_bind,
                pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string())
            ),
            Err(e) => return Err(self.fail(UpgradeState::Spawning, e)),
        }

        self.transition(UpgradeState::AwaitingHandoff);
        if let Err(e) = self.wait_until_listening(temp_bind).await {
            return Err(self.fail(UpgradeState::AwaitingHandoff, e));
        }
        if let Err(e) = self.call_handoff(&url).await {
            return Err(self.fail(UpgradeState::AwaitingHandoff, e));
        }

        self.transition(UpgradeState::HandoffConfirmed);
        tracing::info!("✅ replace successful, {} now serves {}", candidate, bind);

        self.transition(UpgradeState::Exiting);
        self.exit.exit(0);
        Ok(())
    }

    /// Polls the temporary bind until the candidate accepts connections.
    async fn wait_until_listening(&self, temp_bind: &BindAddress) -> Result<()> {
        let deadline = Instant::now() + self.timeouts.startup;
        loop {
            let attempt = tokio::time::timeout(
                READINESS_POLL_INTERVAL,
                TcpStream::connect(temp_bind.socket_target()),
            )
            .await;

            let last_error = match attempt {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) => e.to_string(),
                Err(_) => "connect timed out".to_string(),
            };

            if Instant::now() + READINESS_POLL_INTERVAL > deadline {
                return Err(UpdateError::HandoffError {
                    url: format!("http://{}{}", temp_bind, HANDOFF_PATH),
                    message: format!(
                        "candidate not listening after {:?}: {}",
                        self.timeouts.startup, last_error
                    ),
                });
            }
            tokio::time::sleep(READINESS_POLL_INTERVAL).await;
        }
    }

    /// Single handoff call, never retried.
    async fn call_handoff(&self, url: &url::Url) -> Result<()> {
        tracing::debug!("calling {}", url);
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeouts.handoff)
            .send()
            .await
            .map_err(|e| UpdateError::HandoffError {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpdateError::HandoffError {
                url: url.to_string(),
                message: format!("candidate answered {}: {}", status, body.trim()),
            });
        }

        Ok(())
    }
}
