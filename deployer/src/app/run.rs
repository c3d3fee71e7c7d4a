//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::ServiceError;
use crate::server::serve::serve;
use crate::server::state::ServerState;

/// Run the deployment service until the shutdown signal fires
pub async fn run(
    version: String,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServiceError> {
    info!("Initializing pagedeploy {}...", version);
    let app_state = Arc::new(AppState::init(&options)?);
    run_with_state(app_state, options, shutdown_signal).await
}

/// Run the service around an already-built state
pub async fn run_with_state(
    app_state: Arc<AppState>,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServiceError> {
    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager =
        ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone(), app_state.clone());

    if let Err(e) = init_server(&options, app_state, &mut shutdown_manager, shutdown_tx.subscribe()).await {
        error!("Failed to start server: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

async fn init_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ServiceError> {
    info!("Initializing HTTP server...");

    let server_state = ServerState::new(app_state.controller.clone());
    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Arc<AppState>,
    server_handle: Option<JoinHandle<Result<(), ServiceError>>>,
}

impl ShutdownManager {
    fn new(
        shutdown_tx: broadcast::Sender<()>,
        lifecycle_options: LifecycleOptions,
        app_state: Arc<AppState>,
    ) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state,
            server_handle: None,
        }
    }

    fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), ServiceError>>,
    ) -> Result<(), ServiceError> {
        if self.server_handle.is_some() {
            return Err(ServiceError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), ServiceError> {
        let _ = self.shutdown_tx.send(());
        info!("Shutting down pagedeploy...");

        // 1. Stop accepting requests; in-flight handlers finish first
        if let Some(handle) = self.server_handle.take() {
            match tokio::time::timeout(self.lifecycle_options.max_shutdown_delay, handle).await {
                Ok(joined) => joined.map_err(|e| ServiceError::ShutdownError(e.to_string()))??,
                Err(_) => {
                    return Err(ServiceError::ShutdownError(format!(
                        "server did not stop within {:?}",
                        self.lifecycle_options.max_shutdown_delay
                    )))
                }
            }
        }

        // 2. Detached notifications and Pages checks
        self.app_state
            .shutdown(self.lifecycle_options.max_shutdown_delay)
            .await?;

        info!("Shutdown complete");
        Ok(())
    }
}
