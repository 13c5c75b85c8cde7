use crate::core::{HotUpdateError, Result, ServerError};
use crate::db::{self, DbHandle, DbOperation, MetadataStore, VulnDatabase};
use crate::server::gate::AdmissionGate;
use crate::server::metrics::{UpdateAction, UpdateGauge, record_update};
use crate::storage;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The installed database is current; nothing was touched.
    UpToDate,
    /// A new database was downloaded and swapped in.
    Updated,
}

/// Runs one update cycle: check, download, swap, reopen.
pub struct DbWorker {
    client: Arc<dyn DbOperation>,
    handle: Arc<DbHandle>,
    gate: AdmissionGate,
    gauge: Option<UpdateGauge>,
}

impl DbWorker {
    pub fn new(
        client: Arc<dyn DbOperation>,
        handle: Arc<DbHandle>,
        gate: AdmissionGate,
        gauge: Option<UpdateGauge>,
    ) -> Self {
        Self {
            client,
            handle,
            gate,
            gauge,
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn handle(&self) -> &Arc<DbHandle> {
        &self.handle
    }

    /// Performs a single update cycle against `cache_dir`.
    ///
    /// The attempt timestamp is recorded before anything else; the success
    /// timestamp only after a completed swap. The gate is touched only once a
    /// new database has been downloaded and decoded.
    ///
    /// # Errors
    ///
    /// Returns the stage that failed. On every error path the previous
    /// database is back on disk and open before the gate reopens.
    pub async fn update(
        &self,
        cancel: &CancellationToken,
        app_version: &str,
        cache_dir: &Path,
    ) -> Result<UpdateOutcome> {
        record_update(self.gauge.as_ref(), UpdateAction::Attempt, Utc::now())?;

        debug!("Check for DB update...");
        let needs_update = self
            .client
            .needs_update(app_version, false, false)
            .await
            .map_err(ServerError::CheckUpdate)?;
        if !needs_update {
            return Ok(UpdateOutcome::UpToDate);
        }

        info!("Updating DB...");
        self.hot_update(cancel, cache_dir).await?;

        record_update(self.gauge.as_ref(), UpdateAction::Success, Utc::now())?;
        info!("DB update completed");
        Ok(UpdateOutcome::Updated)
    }

    async fn hot_update(
        &self,
        cancel: &CancellationToken,
        cache_dir: &Path,
    ) -> std::result::Result<(), HotUpdateError> {
        // Removed on drop, on every exit path, together with the backup.
        let staging = tempfile::Builder::new()
            .prefix("db")
            .tempdir()
            .map_err(HotUpdateError::TempDir)?;

        self.client
            .download(cancel, staging.path(), false)
            .await
            .map_err(HotUpdateError::Download)?;

        let staged = DbHandle::path(staging.path());
        let advisories = VulnDatabase::read_from(&staged)
            .await
            .map_err(HotUpdateError::Verify)?
            .advisory_count();
        debug!(advisories, "Downloaded DB verified");

        let backup = Backup::take(cache_dir, &staging.path().join("backup"))
            .await
            .map_err(HotUpdateError::Backup)?;

        info!("Suspending all requests during DB update");
        let mut guard = self.gate.begin_update().await;

        info!("Waiting for all requests to be processed before DB update...");
        guard.wait_for_drain().await;

        let swapped = self.swap(&staged, cache_dir).await;
        if let Err(err) = &swapped {
            self.restore(&backup, cache_dir, err).await;
        }

        guard.end_update();
        swapped
    }

    async fn swap(&self, staged: &Path, cache_dir: &Path) -> std::result::Result<(), HotUpdateError> {
        self.handle.close().await.map_err(HotUpdateError::Close)?;

        let copied = storage::replace_file(staged, &DbHandle::path(cache_dir))
            .await
            .map_err(HotUpdateError::Replace)?;
        debug!(bytes = copied, "Database file replaced");

        self.client
            .update_metadata(cache_dir)
            .await
            .map_err(HotUpdateError::UpdateMetadata)?;

        info!("Reopening DB...");
        self.handle.open(cache_dir).await.map_err(HotUpdateError::Open)?;
        Ok(())
    }

    /// Puts the pre-swap files back and reopens them while the gate is still
    /// closed, so released requests read the previous database.
    async fn restore(&self, backup: &Backup, cache_dir: &Path, cause: &HotUpdateError) {
        if let Err(err) = backup.put_back(cache_dir).await {
            error!(error = %err, cause = %cause, "Failed to restore the previous DB files");
        }
        match self.handle.open(cache_dir).await {
            Ok(()) => warn!(error = %cause, "DB swap failed; serving the previous DB"),
            Err(err) => error!(error = %err, cause = %cause, "DB swap failed and no DB could be reopened"),
        }
    }
}

/// Copy of the live database file and its metadata, taken before a swap.
struct Backup {
    dir: PathBuf,
    has_metadata: bool,
}

impl Backup {
    async fn take(cache_dir: &Path, dir: &Path) -> db::Result<Self> {
        storage::replace_file(&DbHandle::path(cache_dir), &DbHandle::path(dir)).await?;
        let has_metadata = storage::copy_if_exists(
            MetadataStore::new(cache_dir).path(),
            MetadataStore::new(dir).path(),
        )
        .await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            has_metadata,
        })
    }

    async fn put_back(&self, cache_dir: &Path) -> db::Result<()> {
        storage::replace_file(&DbHandle::path(&self.dir), &DbHandle::path(cache_dir)).await?;
        let live_metadata = MetadataStore::new(cache_dir);
        if self.has_metadata {
            storage::replace_file(MetadataStore::new(&self.dir).path(), live_metadata.path()).await?;
        } else {
            storage::remove_if_exists(live_metadata.path()).await?;
        }
        Ok(())
    }
}
