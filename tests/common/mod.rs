#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use vulndb_server::db::{Advisory, DbError, DbHandle, DbOperation, DbType, Metadata, MetadataStore, VulnDatabase};
use vulndb_server::storage::atomic_write;

pub fn fixture_metadata() -> Metadata {
    Metadata {
        version: 1,
        db_type: DbType::Full,
        next_update: Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap(),
        downloaded_at: None,
    }
}

pub fn old_database() -> VulnDatabase {
    VulnDatabase::new(Metadata {
        version: 1,
        db_type: DbType::Full,
        next_update: Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        downloaded_at: None,
    })
    .with_advisory(advisory("CVE-2019-0001", "openssl", "1.0.0"))
}

pub fn new_database() -> VulnDatabase {
    VulnDatabase::new(fixture_metadata())
        .with_advisory(advisory("CVE-2019-0001", "openssl", "1.0.0"))
        .with_advisory(advisory("CVE-2999-0002", "openssl", "1.0.0"))
}

pub fn advisory(id: &str, package: &str, version: &str) -> Advisory {
    Advisory {
        id: id.to_string(),
        package: package.to_string(),
        vulnerable_versions: vec![version.to_string()],
        fixed_version: None,
        severity: "HIGH".to_string(),
        title: format!("{} in {}", id, package),
    }
}

/// Cache dir holding `database` and its metadata, plus a handle opened on it.
pub async fn live_cache(database: &VulnDatabase) -> (TempDir, Arc<DbHandle>) {
    let cache_dir = TempDir::new().unwrap();
    database
        .write_to(&DbHandle::path(cache_dir.path()))
        .await
        .unwrap();
    MetadataStore::new(cache_dir.path())
        .set(&database.metadata)
        .await
        .unwrap();
    let handle = Arc::new(DbHandle::new());
    handle.open(cache_dir.path()).await.unwrap();
    (cache_dir, handle)
}

struct Behavior {
    needs_update: Result<bool, String>,
    download_error: Option<String>,
    download_delay: Duration,
    download_payload: VulnDatabase,
    download_raw: Option<Vec<u8>>,
    update_metadata_error: Option<String>,
    update_metadata_delay: Duration,
    corrupt_live_db: bool,
}

/// Scriptable `DbOperation` that records how it was called.
pub struct FakeDbClient {
    behavior: Mutex<Behavior>,
    pub needs_update_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub update_metadata_calls: AtomicUsize,
    last_download_dir: Mutex<Option<PathBuf>>,
}

impl FakeDbClient {
    pub fn new(needs_update: bool) -> Self {
        Self {
            behavior: Mutex::new(Behavior {
                needs_update: Ok(needs_update),
                download_error: None,
                download_delay: Duration::ZERO,
                download_payload: new_database(),
                download_raw: None,
                update_metadata_error: None,
                update_metadata_delay: Duration::ZERO,
                corrupt_live_db: false,
            }),
            needs_update_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            update_metadata_calls: AtomicUsize::new(0),
            last_download_dir: Mutex::new(None),
        }
    }

    pub fn set_needs_update(&self, needs_update: Result<bool, String>) {
        self.behavior.lock().unwrap().needs_update = needs_update;
    }

    pub fn fail_download(self, message: &str) -> Self {
        self.behavior.lock().unwrap().download_error = Some(message.to_string());
        self
    }

    pub fn download_delay(self, delay: Duration) -> Self {
        self.behavior.lock().unwrap().download_delay = delay;
        self
    }

    /// Stages `bytes` as the downloaded file instead of an encoded database.
    pub fn download_raw(self, bytes: &[u8]) -> Self {
        self.behavior.lock().unwrap().download_raw = Some(bytes.to_vec());
        self
    }

    /// Overwrites the live file with garbage during `update_metadata`, so the
    /// reopen that follows fails.
    pub fn corrupt_live_db(self) -> Self {
        self.behavior.lock().unwrap().corrupt_live_db = true;
        self
    }

    pub fn fail_update_metadata(self, message: &str) -> Self {
        self.behavior.lock().unwrap().update_metadata_error = Some(message.to_string());
        self
    }

    /// Slows the step that runs while the gate is held.
    pub fn update_metadata_delay(self, delay: Duration) -> Self {
        self.behavior.lock().unwrap().update_metadata_delay = delay;
        self
    }

    pub fn last_download_dir(&self) -> Option<PathBuf> {
        self.last_download_dir.lock().unwrap().clone()
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.needs_update_calls.load(Ordering::SeqCst),
            self.download_calls.load(Ordering::SeqCst),
            self.update_metadata_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl DbOperation for FakeDbClient {
    async fn needs_update(&self, app_version: &str, force_full: bool, _skip: bool) -> Result<bool, DbError> {
        self.needs_update_calls.fetch_add(1, Ordering::SeqCst);
        assert!(!app_version.is_empty());
        assert!(!force_full);
        let result = self.behavior.lock().unwrap().needs_update.clone();
        result.map_err(DbError::Client)
    }

    async fn download(&self, cancel: &CancellationToken, dest_dir: &Path, quiet: bool) -> Result<(), DbError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        assert!(!quiet);
        *self.last_download_dir.lock().unwrap() = Some(dest_dir.to_path_buf());

        let (delay, error, payload, raw) = {
            let behavior = self.behavior.lock().unwrap();
            (
                behavior.download_delay,
                behavior.download_error.clone(),
                behavior.download_payload.clone(),
                behavior.download_raw.clone(),
            )
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DbError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        if let Some(message) = error {
            return Err(DbError::Client(message));
        }
        match raw {
            Some(bytes) => atomic_write(&DbHandle::path(dest_dir), &bytes).await,
            None => payload.write_to(&DbHandle::path(dest_dir)).await,
        }
    }

    async fn update_metadata(&self, cache_dir: &Path) -> Result<(), DbError> {
        self.update_metadata_calls.fetch_add(1, Ordering::SeqCst);
        let (delay, error, corrupt) = {
            let behavior = self.behavior.lock().unwrap();
            (
                behavior.update_metadata_delay,
                behavior.update_metadata_error.clone(),
                behavior.corrupt_live_db,
            )
        };
        tokio::time::sleep(delay).await;
        if let Some(message) = error {
            return Err(DbError::Client(message));
        }
        let database = VulnDatabase::read_from(&DbHandle::path(cache_dir)).await?;
        MetadataStore::new(cache_dir).set(&database.metadata).await?;
        if corrupt {
            atomic_write(&DbHandle::path(cache_dir), b"corrupted after replace").await?;
        }
        Ok(())
    }
}
