//! File helpers for replacing on-disk state without exposing partial writes.

use crate::db::{DbError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// File written through a sibling temp file and renamed over its target on
/// `commit`. Dropped without a commit, the temp file is removed and the target
/// is left as it was.
pub struct StagedFile {
    path: PathBuf,
    tmp: PathBuf,
    file: Option<fs::File>,
    written: u64,
}

impl StagedFile {
    pub async fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| DbError::io(parent, err))?;
        }

        let tmp = temp_path(path);
        let file = fs::File::create(&tmp)
            .await
            .map_err(|err| DbError::io(&tmp, err))?;
        Ok(Self {
            path: path.to_path_buf(),
            tmp,
            file: Some(file),
            written: 0,
        })
    }

    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            DbError::io(&self.tmp, std::io::Error::other("staged file already committed"))
        })?;
        file.write_all(bytes)
            .await
            .map_err(|err| DbError::io(&self.tmp, err))?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Syncs the temp file and renames it over the target.
    pub async fn commit(mut self) -> Result<u64> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .await
                .map_err(|err| DbError::io(&self.tmp, err))?;
        }
        fs::rename(&self.tmp, &self.path)
            .await
            .map_err(|err| DbError::io(&self.path, err))?;
        Ok(self.written)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        // Still present only when `commit` did not rename it.
        let _ = std::fs::remove_file(&self.tmp);
    }
}

/// Writes `bytes` to a sibling temp file, syncs it, then renames it over `path`.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut staged = StagedFile::create(path).await?;
    staged.write(bytes).await?;
    staged.commit().await?;
    Ok(())
}

/// Copies `src` over `dst`. Readers opening `dst` see either the old or the new
/// file, never a mix.
pub async fn replace_file(src: &Path, dst: &Path) -> Result<u64> {
    let bytes = fs::read(src).await.map_err(|err| DbError::io(src, err))?;
    atomic_write(dst, &bytes).await?;
    Ok(bytes.len() as u64)
}

/// Like [`replace_file`], but a missing `src` is not an error. Returns whether
/// anything was copied.
pub async fn copy_if_exists(src: &Path, dst: &Path) -> Result<bool> {
    match fs::read(src).await {
        Ok(bytes) => {
            atomic_write(dst, &bytes).await?;
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(DbError::io(src, err)),
    }
}

pub async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(DbError::io(path, err)),
    }
}
