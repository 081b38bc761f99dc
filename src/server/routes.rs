use crate::core::check::newest_candidate;
use crate::core::{Candidate, ConfigProvider};
use crate::server::AppState;
use crate::utils::error::{Result, UpdateError};
use axum::extract::State;
use axum::http::StatusCode;
use std::sync::Arc;

async fn find_candidate(state: &AppState) -> Result<Candidate> {
    let settings = &state.settings;
    newest_candidate(
        settings.upgrade_dir(),
        &state.version,
        settings.probe_timeout(),
        settings.probe_concurrency(),
    )
    .await
}

fn error_response(err: UpdateError) -> (StatusCode, String) {
    if err.is_no_candidate() {
        return (StatusCode::NOT_FOUND, err.to_string());
    }
    tracing::error!("find update candidate: {}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// `GET /check`
pub async fn check(State(state): State<Arc<AppState>>) -> (StatusCode, String) {
    match find_candidate(&state).await {
        Ok(candidate) => (
            StatusCode::OK,
            format!("candidate: {} ({})", candidate.path.display(), candidate.version),
        ),
        Err(e) => error_response(e),
    }
}

/// `POST /upgrade`
///
/// The upgrade runs in its own task because stopping the listener drains
/// in-flight requests, this one included.
pub async fn upgrade(State(state): State<Arc<AppState>>) -> (StatusCode, String) {
    if state.orchestrator.is_in_progress() {
        return (StatusCode::CONFLICT, UpdateError::UpgradeInProgress.to_string());
    }

    let candidate = match find_candidate(&state).await {
        Ok(candidate) => candidate,
        Err(e) => return error_response(e),
    };

    // 只有取得監聽控制權的請求可以執行升級
    let Some(mut listener) = state.take_listener().await else {
        return (StatusCode::CONFLICT, UpdateError::UpgradeInProgress.to_string());
    };

    let body = format!("upgrading to {}", candidate);
    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        let settings = &task_state.settings;
        let result = task_state
            .orchestrator
            .upgrade(&candidate, &mut listener, settings.temp_bind(), settings.bind())
            .await;
        if let Err(e) = result {
            tracing::error!("upgrade to {} aborted, service left stopped: {}", candidate, e);
        }
    });

    (StatusCode::ACCEPTED, body)
}

/// `GET /version`
pub async fn version(State(state): State<Arc<AppState>>) -> String {
    state.version.to_string()
}
