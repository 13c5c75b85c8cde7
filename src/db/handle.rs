use super::error::{DbError, Result};
use super::metadata::Metadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub id: String,
    pub package: String,
    /// Exact versions affected. Empty means every version.
    #[serde(default)]
    pub vulnerable_versions: Vec<String>,
    #[serde(default)]
    pub fixed_version: Option<String>,
    pub severity: String,
    #[serde(default)]
    pub title: String,
}

impl Advisory {
    pub fn affects(&self, version: &str) -> bool {
        self.vulnerable_versions.is_empty() || self.vulnerable_versions.iter().any(|v| v == version)
    }
}

/// Contents of the on-disk vulnerability database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnDatabase {
    pub metadata: Metadata,
    advisories: BTreeMap<String, Vec<Advisory>>,
}

impl VulnDatabase {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            advisories: BTreeMap::new(),
        }
    }

    pub fn with_advisory(mut self, advisory: Advisory) -> Self {
        self.add_advisory(advisory);
        self
    }

    pub fn add_advisory(&mut self, advisory: Advisory) {
        self.advisories
            .entry(advisory.package.clone())
            .or_default()
            .push(advisory);
    }

    pub fn advisories(&self, package: &str) -> &[Advisory] {
        self.advisories
            .get(package)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn advisory_count(&self) -> usize {
        self.advisories.values().map(Vec::len).sum()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    pub async fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).await.map_err(|err| DbError::io(path, err))?;
        Self::decode(&bytes)
    }

    pub async fn write_to(&self, path: &Path) -> Result<()> {
        crate::storage::atomic_write(path, &self.encode()?).await
    }
}

/// Owned handle to the live database.
///
/// At most one database is loaded at a time. The update worker replaces it with
/// `close` + `open`; request handlers only read through it.
#[derive(Debug, Default)]
pub struct DbHandle {
    current: RwLock<Option<Arc<VulnDatabase>>>,
}

impl DbHandle {
    /// Creates a closed handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the database file inside `cache_dir`.
    pub fn path(cache_dir: &Path) -> PathBuf {
        super::db_dir(cache_dir).join(super::DB_FILE_NAME)
    }

    pub async fn open(&self, cache_dir: &Path) -> Result<()> {
        let database = VulnDatabase::read_from(&Self::path(cache_dir)).await?;
        *self.current.write().await = Some(Arc::new(database));
        Ok(())
    }

    /// Drops the loaded database. Closing a closed handle is a no-op.
    pub async fn close(&self) -> Result<()> {
        self.current.write().await.take();
        Ok(())
    }

    pub async fn is_open(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn snapshot(&self) -> Result<Arc<VulnDatabase>> {
        self.current.read().await.clone().ok_or(DbError::NotOpen)
    }

    pub async fn metadata(&self) -> Result<Metadata> {
        Ok(self.snapshot().await?.metadata.clone())
    }

    pub async fn lookup(&self, package: &str, version: Option<&str>) -> Result<Vec<Advisory>> {
        let database = self.snapshot().await?;
        Ok(database
            .advisories(package)
            .iter()
            .filter(|advisory| version.is_none_or(|v| advisory.affects(v)))
            .cloned()
            .collect())
    }
}
