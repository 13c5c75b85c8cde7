//! HTTP-backed implementation of [`DbOperation`].

use super::client::DbOperation;
use super::error::{DbError, Result};
use super::handle::{DbHandle, VulnDatabase};
use super::metadata::{DbType, Metadata, MetadataStore};
use super::SCHEMA_VERSION;
use crate::storage::StagedFile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Largest database file accepted from the repository.
pub const DEFAULT_MAX_DB_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Downloads the database file from a repository URL and keeps
/// `metadata.json` in the cache directory in sync with it.
#[derive(Debug, Clone)]
pub struct RemoteDbClient {
    http: reqwest::Client,
    repository: String,
    cache_dir: PathBuf,
    light: bool,
    max_size: u64,
}

impl RemoteDbClient {
    pub fn new(repository: &str, cache_dir: &Path) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            http,
            repository: repository.to_string(),
            cache_dir: cache_dir.to_path_buf(),
            light: false,
            max_size: DEFAULT_MAX_DB_SIZE,
        })
    }

    /// Track the light tier instead of the full one.
    pub fn light(mut self, light: bool) -> Self {
        self.light = light;
        self
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    fn wanted_type(&self, force_full: bool) -> DbType {
        if self.light && !force_full {
            DbType::Light
        } else {
            DbType::Full
        }
    }

    /// Streams the repository file into `dest`. `dest` is replaced only once
    /// the whole body has arrived within the size limit.
    async fn fetch_to(&self, dest: &Path) -> Result<u64> {
        let mut response = self
            .http
            .get(&self.repository)
            .send()
            .await?
            .error_for_status()?;
        let limit = self.max_size;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(DbError::TooLarge { limit });
        }

        let mut staged = StagedFile::create(dest).await?;
        while let Some(chunk) = response.chunk().await? {
            if staged.written() + chunk.len() as u64 > limit {
                return Err(DbError::TooLarge { limit });
            }
            staged.write(&chunk).await?;
        }
        staged.commit().await
    }
}

/// Decides whether `installed` should be replaced, following the order of
/// checks the server has always used.
pub fn decide_update(
    installed: Option<&Metadata>,
    wanted: DbType,
    skip: bool,
    now: DateTime<Utc>,
) -> Result<bool> {
    let Some(metadata) = installed else {
        if skip {
            error!("The first run cannot skip downloading DB");
            return Err(DbError::MissingDatabase);
        }
        return Ok(true);
    };

    if metadata.version > SCHEMA_VERSION {
        error!(
            local = metadata.version,
            expected = SCHEMA_VERSION,
            "The local DB schema is newer than this server supports"
        );
        return Err(DbError::SchemaMismatch {
            local: metadata.version,
            expected: SCHEMA_VERSION,
        });
    }

    if skip {
        if metadata.version != SCHEMA_VERSION {
            return Err(DbError::SchemaMismatch {
                local: metadata.version,
                expected: SCHEMA_VERSION,
            });
        }
        return Ok(false);
    }

    if metadata.version == SCHEMA_VERSION && metadata.db_type == wanted && now < metadata.next_update {
        debug!("DB update was skipped because DB is the latest");
        return Ok(false);
    }
    Ok(true)
}

#[async_trait]
impl DbOperation for RemoteDbClient {
    async fn needs_update(&self, app_version: &str, force_full: bool, skip: bool) -> Result<bool> {
        let installed = match MetadataStore::new(&self.cache_dir).get_optional().await {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!(error = %err, "There is no valid metadata file");
                None
            }
        };
        debug!(app_version, "Checking DB metadata");
        decide_update(installed.as_ref(), self.wanted_type(force_full), skip, Utc::now())
    }

    async fn download(&self, cancel: &CancellationToken, dest_dir: &Path, quiet: bool) -> Result<()> {
        if quiet {
            debug!(repository = %self.repository, "Downloading DB");
        } else {
            info!(repository = %self.repository, "Downloading DB");
        }

        let dest = DbHandle::path(dest_dir);
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DbError::Cancelled),
            written = self.fetch_to(&dest) => written?,
        };
        debug!(path = %dest.display(), bytes = written, "DB downloaded");
        Ok(())
    }

    async fn update_metadata(&self, cache_dir: &Path) -> Result<()> {
        let database = VulnDatabase::read_from(&DbHandle::path(cache_dir)).await?;
        let mut metadata = database.metadata;
        metadata.downloaded_at = Some(Utc::now());
        MetadataStore::new(cache_dir).set(&metadata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap()
    }

    fn metadata(version: u32, db_type: DbType, next_update: DateTime<Utc>) -> Metadata {
        Metadata {
            version,
            db_type,
            next_update,
            updated_at: now(),
            downloaded_at: None,
        }
    }

    #[test]
    fn test_first_run_downloads() {
        assert!(decide_update(None, DbType::Full, false, now()).unwrap());
    }

    #[test]
    fn test_first_run_cannot_skip() {
        let err = decide_update(None, DbType::Full, true, now()).unwrap_err();
        assert!(matches!(err, DbError::MissingDatabase));
    }

    #[test]
    fn test_latest_db_is_kept() {
        let installed = metadata(SCHEMA_VERSION, DbType::Full, Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap());
        assert!(!decide_update(Some(&installed), DbType::Full, false, now()).unwrap());
    }

    #[test]
    fn test_expired_db_is_updated() {
        let installed = metadata(SCHEMA_VERSION, DbType::Full, Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap());
        assert!(decide_update(Some(&installed), DbType::Full, false, now()).unwrap());
    }

    #[test]
    fn test_type_change_is_updated() {
        let installed = metadata(SCHEMA_VERSION, DbType::Light, Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap());
        assert!(decide_update(Some(&installed), DbType::Full, false, now()).unwrap());
    }

    #[test]
    fn test_old_schema_is_updated() {
        let installed = metadata(SCHEMA_VERSION - 1, DbType::Full, Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap());
        assert!(decide_update(Some(&installed), DbType::Full, false, now()).unwrap());
        assert!(decide_update(Some(&installed), DbType::Full, true, now()).is_err());
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let installed = metadata(SCHEMA_VERSION + 1, DbType::Full, now());
        let err = decide_update(Some(&installed), DbType::Full, false, now()).unwrap_err();
        assert!(err.to_string().contains("schema doesn't match"));
    }

    #[test]
    fn test_skip_keeps_current_schema() {
        let installed = metadata(SCHEMA_VERSION, DbType::Full, Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap());
        assert!(!decide_update(Some(&installed), DbType::Full, true, now()).unwrap());
    }

    #[test]
    fn test_force_full_overrides_light() {
        let temp_dir = TempDir::new().unwrap();
        let client = RemoteDbClient::new("http://localhost/vuln.db", temp_dir.path())
            .unwrap()
            .light(true);
        assert_eq!(client.wanted_type(false), DbType::Light);
        assert_eq!(client.wanted_type(true), DbType::Full);
    }

    #[tokio::test]
    async fn test_update_metadata_from_live_file() {
        let temp_dir = TempDir::new().unwrap();
        let embedded = metadata(SCHEMA_VERSION, DbType::Light, now());
        VulnDatabase::new(embedded.clone())
            .write_to(&DbHandle::path(temp_dir.path()))
            .await
            .unwrap();

        let client = RemoteDbClient::new("http://localhost/vuln.db", temp_dir.path()).unwrap();
        client.update_metadata(temp_dir.path()).await.unwrap();

        let stored = MetadataStore::new(temp_dir.path()).get().await.unwrap();
        assert_eq!(stored.version, embedded.version);
        assert_eq!(stored.db_type, DbType::Light);
        assert!(stored.downloaded_at.is_some());
    }

    async fn serve_file(body: Vec<u8>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().route(
            "/vuln.db",
            axum::routing::get(move || {
                let body = body.clone();
                async move { body }
            }),
        );
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}/vuln.db", addr)
    }

    #[tokio::test]
    async fn test_download_streams_to_dest() {
        let temp_dir = TempDir::new().unwrap();
        let database = VulnDatabase::new(metadata(SCHEMA_VERSION, DbType::Full, now()));
        let url = serve_file(database.encode().unwrap()).await;

        let client = RemoteDbClient::new(&url, temp_dir.path()).unwrap();
        client
            .download(&CancellationToken::new(), temp_dir.path(), true)
            .await
            .unwrap();

        let stored = VulnDatabase::read_from(&DbHandle::path(temp_dir.path())).await.unwrap();
        assert_eq!(stored, database);
    }

    #[tokio::test]
    async fn test_download_over_limit_keeps_dest() {
        let temp_dir = TempDir::new().unwrap();
        let dest = DbHandle::path(temp_dir.path());
        crate::storage::atomic_write(&dest, b"previous").await.unwrap();
        let url = serve_file(vec![7u8; 100]).await;

        let client = RemoteDbClient::new(&url, temp_dir.path()).unwrap().max_size(16);
        let err = client
            .download(&CancellationToken::new(), temp_dir.path(), true)
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::TooLarge { limit: 16 }));
        assert_eq!(std::fs::read(&dest).unwrap(), b"previous");
        let leftovers: Vec<_> = std::fs::read_dir(dest.parent().unwrap()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_download_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        // TEST-NET address, never reached.
        let client = RemoteDbClient::new("http://192.0.2.1:9/vuln.db", temp_dir.path()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client.download(&cancel, temp_dir.path(), true).await.unwrap_err();
        assert!(matches!(err, DbError::Cancelled));
        assert!(!DbHandle::path(temp_dir.path()).exists());
    }
}
