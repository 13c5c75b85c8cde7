//! Background loop driving the update worker on a fixed interval.

use crate::core::{Result, ServerError};
use crate::server::worker::DbWorker;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub app_version: String,
    pub cache_dir: PathBuf,
}

/// Handle to the running scheduler. Dropping it stops the loop once the cycle
/// in progress, if any, has finished.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signals the loop to stop and waits for it to finish. A download in
    /// progress observes the same token and aborts.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| ServerError::Task(format!("update scheduler join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        // The task is detached, not aborted: a swap must not stop between
        // closing and reopening the database.
        self.cancel.cancel();
    }
}

/// Spawns the update loop. The first cycle runs one interval after start.
pub fn spawn_update_scheduler(
    worker: Arc<DbWorker>,
    config: SchedulerConfig,
    cancel: CancellationToken,
) -> SchedulerHandle {
    let cancel_for_loop = cancel.clone();
    let join_handle = tokio::spawn(async move {
        run_update_loop(worker, config, cancel_for_loop).await;
    });

    SchedulerHandle {
        cancel,
        join_handle: Some(join_handle),
    }
}

async fn run_update_loop(worker: Arc<DbWorker>, config: SchedulerConfig, cancel: CancellationToken) {
    info!(
        interval_secs = config.interval.as_secs(),
        cache_dir = %config.cache_dir.display(),
        "DB update scheduler started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("DB update scheduler shutting down");
                break;
            }
            _ = sleep(config.interval) => {
                match worker.update(&cancel, &config.app_version, &config.cache_dir).await {
                    Ok(outcome) => debug!(?outcome, "DB update cycle finished"),
                    Err(err) => error!(error = %err, "DB update cycle failed"),
                }
            }
        }
    }
}
