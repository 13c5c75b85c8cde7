use super::error::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Operations the update worker needs from a database distribution source.
///
/// Calls happen in order: `needs_update`, then `download` into a staging
/// directory, then `update_metadata` against the live cache directory once the
/// downloaded file has been swapped in.
#[async_trait]
pub trait DbOperation: Send + Sync {
    async fn needs_update(&self, app_version: &str, force_full: bool, skip: bool) -> Result<bool>;

    /// Downloads a database into `<dest_dir>/db/`. Must return
    /// `DbError::Cancelled` once `cancel` fires.
    async fn download(&self, cancel: &CancellationToken, dest_dir: &Path, quiet: bool) -> Result<()>;

    async fn update_metadata(&self, cache_dir: &Path) -> Result<()>;
}
