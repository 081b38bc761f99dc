#![cfg(all(unix, feature = "cli"))]

use async_trait::async_trait;
use self_update::adapters::process::{ProcessLauncher, TakeoverOptions};
use self_update::config::Overrides;
use self_update::core::{CandidateLauncher, ProcessExit};
use self_update::server::{self, AppState};
use self_update::{BindAddress, Candidate, Result, Settings, UpgradeOrchestrator, Version, VERSION};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Clone, Default)]
struct RecordingExit(Arc<Mutex<Vec<i32>>>);

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        self.0.lock().unwrap().push(code);
    }
}

/// Launches the real binary and remembers its pid for cleanup.
struct TrackingLauncher {
    inner: ProcessLauncher,
    pids: Arc<Mutex<Vec<u32>>>,
}

#[async_trait]
impl CandidateLauncher for TrackingLauncher {
    async fn launch(
        &self,
        candidate: &Candidate,
        temp_bind: &BindAddress,
        bind: &BindAddress,
    ) -> Result<Option<u32>> {
        let pid = self.inner.launch(candidate, temp_bind, bind).await?;
        if let Some(pid) = pid {
            self.pids.lock().unwrap().push(pid);
        }
        Ok(pid)
    }
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_running_service_hands_over_to_newer_build() {
    let dir = TempDir::new().unwrap();
    std::os::unix::fs::symlink(
        env!("CARGO_BIN_EXE_self-update"),
        dir.path().join("self-update-next"),
    )
    .unwrap();

    let settings = Settings::resolve(
        Overrides {
            bind: Some(format!("127.0.0.1:{}", free_port())),
            temp_bind: Some(format!("127.0.0.1:{}", free_port())),
            upgrade_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        },
        None,
    )
    .unwrap();
    let bind = settings.bind.clone();
    let options = TakeoverOptions::from_settings(&settings);

    let exit = RecordingExit::default();
    let pids = Arc::new(Mutex::new(Vec::new()));
    let launcher: Box<dyn CandidateLauncher> = Box::new(TrackingLauncher {
        inner: ProcessLauncher::new(options),
        pids: Arc::clone(&pids),
    });
    let exit_port: Box<dyn ProcessExit> = Box::new(exit.clone());
    let orchestrator = UpgradeOrchestrator::new(launcher, exit_port, settings.upgrade_timeouts());

    // 以較舊的版本啟動，讓建置出的執行檔成為候選
    let app = Arc::new(AppState::new(Version::new(0, 0, 1), settings, orchestrator));
    let addr = server::start_service(&app).await.unwrap();

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let response = client
        .post(format!("http://{}/upgrade", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    let mut exited = false;
    for _ in 0..150 {
        if !exit.0.lock().unwrap().is_empty() {
            exited = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // 新的連線池，避免重用舊程序的連線
    let served = if exited {
        reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
            .get(format!("http://{}/version", bind))
            .send()
            .await
            .ok()
    } else {
        None
    };
    let served_version = match served {
        Some(response) => response.text().await.ok(),
        None => None,
    };

    for pid in pids.lock().unwrap().iter() {
        let _ = std::process::Command::new("kill").arg(pid.to_string()).status();
    }

    assert!(exited, "upgrade did not complete");
    assert_eq!(exit.0.lock().unwrap().clone(), vec![0]);
    assert_eq!(served_version.as_deref(), Some(VERSION));
    assert!(!app.is_serving().await);
}
