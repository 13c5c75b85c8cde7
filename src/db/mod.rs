//! Local vulnerability database: file layout, handle, metadata and the client
//! contract used to fetch new versions.

pub mod client;
pub mod error;
pub mod handle;
pub mod metadata;
pub mod remote;

use std::path::{Path, PathBuf};

pub use client::DbOperation;
pub use error::{DbError, Result};
pub use handle::{Advisory, DbHandle, VulnDatabase};
pub use metadata::{DbType, Metadata, MetadataStore};
pub use remote::RemoteDbClient;

/// Schema version of the database file this server understands.
pub const SCHEMA_VERSION: u32 = 1;

pub const DB_FILE_NAME: &str = "vuln.db";

/// Directory holding the database file and its metadata inside a cache dir.
pub fn db_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join("db")
}
