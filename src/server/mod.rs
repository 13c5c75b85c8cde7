//! Vulnerability lookup server with background database hot swap.
//!
//! Startup sequence:
//! 1. make sure the cache directory holds a database (download it if needed),
//! 2. open the database handle,
//! 3. register the update gauge and seed it from persisted metadata,
//! 4. spawn the update scheduler,
//! 5. serve every route behind the token check and the admission gate.

pub mod config;
pub mod gate;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod scheduler;
pub mod worker;

pub use config::ServerConfig;
pub use gate::{AdmissionGate, GatePhase, RequestPermit, UpdateGuard};
pub use metrics::{UpdateAction, UpdateGauge};
pub use scheduler::{SchedulerConfig, SchedulerHandle, spawn_update_scheduler};
pub use worker::{DbWorker, UpdateOutcome};

use crate::core::{Result, ServerError};
use crate::db::{DbHandle, DbOperation};
use axum::Router;
use middleware::TokenAuth;
use prometheus::Registry;
use routes::AppState;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Server {
    config: ServerConfig,
    db: Arc<DbHandle>,
    gate: AdmissionGate,
    registry: Registry,
    worker: Arc<DbWorker>,
}

impl Server {
    /// Prepares the database, metrics and update worker without binding a
    /// socket or starting the scheduler.
    pub async fn init(config: ServerConfig, client: Arc<dyn DbOperation>) -> Result<Self> {
        config.validate().map_err(ServerError::Config)?;

        prepare_database(client.as_ref(), &config).await?;

        let db = Arc::new(DbHandle::new());
        db.open(&config.cache_dir).await?;

        let registry = Registry::new();
        let gauge = UpdateGauge::register(&registry)?;
        if let Err(err) = metrics::seed_from_metadata(Some(&gauge), &config.cache_dir).await {
            warn!(error = %err, "Update gauge starts unseeded");
        }

        let gate = AdmissionGate::new();
        let worker = Arc::new(DbWorker::new(
            client,
            Arc::clone(&db),
            gate.clone(),
            Some(gauge),
        ));

        Ok(Self {
            config,
            db,
            gate,
            registry,
            worker,
        })
    }

    pub fn router(&self) -> Result<Router> {
        let auth = TokenAuth::new(&self.config.token, &self.config.token_header)
            .map_err(ServerError::Config)?;
        let state = AppState {
            db: Arc::clone(&self.db),
            registry: self.registry.clone(),
        };
        Ok(routes::router(state, self.gate.clone(), auth))
    }

    pub fn worker(&self) -> &Arc<DbWorker> {
        &self.worker
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Starts the update scheduler and serves until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router()?;
        let scheduler = spawn_update_scheduler(
            Arc::clone(&self.worker),
            SchedulerConfig {
                interval: self.config.update_interval,
                app_version: self.config.app_version.clone(),
                cache_dir: self.config.cache_dir.clone(),
            },
            CancellationToken::new(),
        );

        let listener = TcpListener::bind(&self.config.listen).await?;
        info!("Listening {}...", self.config.listen);

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        scheduler.shutdown().await?;
        self.db.close().await?;
        served?;
        Ok(())
    }
}

/// Downloads a database into the cache directory when none is usable.
async fn prepare_database(client: &dyn DbOperation, config: &ServerConfig) -> Result<()> {
    let needs_update = client
        .needs_update(&config.app_version, false, config.skip_update)
        .await
        .map_err(ServerError::CheckUpdate)?;
    if !needs_update {
        return Ok(());
    }

    info!("Need to update DB");
    let cancel = CancellationToken::new();
    client.download(&cancel, &config.cache_dir, false).await?;
    client.update_metadata(&config.cache_dir).await?;
    Ok(())
}

/// Initializes and serves until Ctrl-C.
pub async fn listen_and_serve(config: ServerConfig, client: Arc<dyn DbOperation>) -> Result<()> {
    let server = Server::init(config, client).await?;
    server.serve(shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
