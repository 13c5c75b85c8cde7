//! Metadata record describing the installed vulnerability database.

use super::error::{DbError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Tier of the vulnerability database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Light,
    #[default]
    Full,
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbType::Light => f.write_str("light"),
            DbType::Full => f.write_str("full"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub version: u32,
    #[serde(rename = "type")]
    pub db_type: DbType,
    pub next_update: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<DateTime<Utc>>,
}

/// Reads and writes `metadata.json` next to the database file.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            path: super::db_dir(cache_dir.as_ref()).join("metadata.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self) -> Result<Metadata> {
        let bytes = fs::read(&self.path)
            .await
            .map_err(|err| DbError::io(&self.path, err))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Returns `None` when no metadata has been written yet.
    pub async fn get_optional(&self) -> Result<Option<Metadata>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(DbError::io(&self.path, err)),
        }
    }

    pub async fn set(&self, metadata: &Metadata) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(metadata)?;
        crate::storage::atomic_write(&self.path, &bytes).await
    }
}
