pub mod handoff;
pub mod routes;

use crate::config::Settings;
use crate::core::upgrade::UpgradeOrchestrator;
use crate::core::{BindAddress, CandidateLauncher, Listener, ProcessExit, Version};
use crate::utils::error::{Result, UpdateError};
use async_trait::async_trait;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub type SharedOrchestrator = UpgradeOrchestrator<Box<dyn CandidateLauncher>, Box<dyn ProcessExit>>;

const BIND_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Application state shared across handlers
pub struct AppState {
    pub version: Version,
    pub settings: Settings,
    pub orchestrator: SharedOrchestrator,
    /// Server on the permanent bind. Taken by the upgrade that stops it.
    listener: Mutex<Option<ServerHandle>>,
}

impl AppState {
    pub fn new(version: Version, settings: Settings, orchestrator: SharedOrchestrator) -> Self {
        Self {
            version,
            settings,
            orchestrator,
            listener: Mutex::new(None),
        }
    }

    pub async fn set_listener(&self, handle: ServerHandle) {
        *self.listener.lock().await = Some(handle);
    }

    pub async fn take_listener(&self) -> Option<ServerHandle> {
        self.listener.lock().await.take()
    }

    pub async fn is_serving(&self) -> bool {
        self.listener.lock().await.is_some()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().await.as_ref().map(|h| h.local_addr())
    }
}

/// A running `axum` server. Dropping the handle also stops the server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Listener for ServerHandle {
    async fn shutdown(&mut self, timeout: Duration) -> Result<()> {
        let (Some(signal), Some(task)) = (self.shutdown.take(), self.task.take()) else {
            return Ok(());
        };

        let _ = signal.send(());
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(UpdateError::ShutdownError {
                message: format!("server on {} failed: {}", self.local_addr, e),
            }),
            Ok(Err(e)) => Err(UpdateError::ShutdownError {
                message: format!("server task on {} panicked: {}", self.local_addr, e),
            }),
            Err(_) => Err(UpdateError::ShutdownError {
                message: format!(
                    "in-flight requests on {} not drained within {:?}",
                    self.local_addr, timeout
                ),
            }),
        }
    }
}

/// Binds `bind`, retrying while the address is still held for up to `window`.
pub async fn bind(bind: &BindAddress, window: Duration) -> Result<TcpListener> {
    let deadline = Instant::now() + window;
    loop {
        match TcpListener::bind(bind.socket_target()).await {
            Ok(listener) => return Ok(listener),
            Err(e) if Instant::now() + BIND_RETRY_INTERVAL <= deadline => {
                tracing::debug!("bind {}: {}, retrying", bind, e);
                tokio::time::sleep(BIND_RETRY_INTERVAL).await;
            }
            Err(e) => return Err(UpdateError::IoError(e)),
        }
    }
}

/// Serves `router` on `listener` in a background task.
pub fn serve(listener: TcpListener, router: Router) -> Result<ServerHandle> {
    let local_addr = listener.local_addr()?;
    let (signal, stopped) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stopped.await;
            })
            .await
    });

    tracing::info!("  Listening on http://{}", local_addr);
    Ok(ServerHandle {
        local_addr,
        shutdown: Some(signal),
        task: Some(task),
    })
}

async fn log_request(request: Request, next: Next) -> Response {
    tracing::info!(
        method = %request.method(),
        uri = %request.uri(),
        "handle HTTP request"
    );
    next.run(request).await
}

/// Routes of the service on the permanent bind.
pub fn service_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/check", get(routes::check))
        .route("/upgrade", post(routes::upgrade))
        .route("/version", get(routes::version))
        .with_state(state)
        .layer(middleware::from_fn(log_request))
}

/// Starts the service on the permanent bind and records it in `state`.
pub async fn start_service(state: &Arc<AppState>) -> Result<SocketAddr> {
    let listener = bind(&state.settings.bind, Duration::ZERO).await?;
    let handle = serve(listener, service_router(Arc::clone(state)))?;
    let addr = handle.local_addr();
    state.set_listener(handle).await;
    Ok(addr)
}

/// Stops whatever still serves the permanent bind.
pub async fn stop_service(state: &AppState) -> Result<()> {
    match state.take_listener().await {
        Some(mut handle) => handle.shutdown(state.settings.shutdown_timeout).await,
        None => Ok(()),
    }
}
