use crate::core::upgrade::HANDOFF_PATH;
use crate::core::Listener;
use crate::server::{self, AppState, ServerHandle};
use crate::utils::error::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Serves `GET /replace` from a candidate started in takeover mode.
///
/// The first successful call binds the permanent address and starts the
/// service on it. Later calls answer 200 without binding again.
pub struct HandoffProtocolHandler {
    app: Arc<AppState>,
    temp_listener: Mutex<Option<ServerHandle>>,
    took_over: Mutex<bool>,
}

impl HandoffProtocolHandler {
    pub fn new(app: Arc<AppState>) -> Self {
        Self {
            app,
            temp_listener: Mutex::new(None),
            took_over: Mutex::new(false),
        }
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(HANDOFF_PATH, get(replace))
            .route(
                "/version",
                get(|State(handler): State<Arc<HandoffProtocolHandler>>| async move {
                    handler.app.version.to_string()
                }),
            )
            .with_state(Arc::clone(self))
            .layer(middleware::from_fn(server::log_request))
    }

    /// Binds the temporary address and serves the handoff routes on it.
    pub async fn listen(self: &Arc<Self>) -> Result<()> {
        let listener = server::bind(&self.app.settings.temp_bind, self.app.settings.startup_timeout).await?;
        let handle = server::serve(listener, self.router())?;
        tracing::info!(
            "⏳ waiting for handoff on {} to take over {}",
            handle.local_addr(),
            self.app.settings.bind
        );
        *self.temp_listener.lock().await = Some(handle);
        Ok(())
    }

    pub async fn has_taken_over(&self) -> bool {
        *self.took_over.lock().await
    }

    /// Binds the permanent address once. Concurrent callers wait for the first.
    pub async fn take_over(&self) -> Result<()> {
        let mut took_over = self.took_over.lock().await;
        if *took_over {
            return Ok(());
        }

        // 舊程序剛停止，位址可能尚未釋放
        let settings = &self.app.settings;
        let listener = server::bind(&settings.bind, settings.startup_timeout).await?;
        let handle = server::serve(listener, server::service_router(Arc::clone(&self.app)))?;
        self.app.set_listener(handle).await;

        *took_over = true;
        tracing::info!("✅ took over {}", settings.bind);
        Ok(())
    }

    /// Stops the temporary listener after in-flight handoff responses are sent.
    pub async fn release_temp_listener(&self) -> Result<()> {
        let handle = self.temp_listener.lock().await.take();
        match handle {
            Some(mut handle) => {
                let addr = handle.local_addr();
                handle.shutdown(self.app.settings.shutdown_timeout).await?;
                tracing::info!("temporary listener on {} stopped", addr);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

async fn replace(State(handler): State<Arc<HandoffProtocolHandler>>) -> (StatusCode, String) {
    if let Err(e) = handler.take_over().await {
        tracing::error!("take over {}: {}", handler.app.settings.bind, e);
        return (StatusCode::SERVICE_UNAVAILABLE, e.to_string());
    }

    let releasing = Arc::clone(&handler);
    tokio::spawn(async move {
        if let Err(e) = releasing.release_temp_listener().await {
            tracing::warn!("stop temporary listener: {}", e);
        }
    });

    (
        StatusCode::OK,
        format!("serving on {}", handler.app.settings.bind),
    )
}
