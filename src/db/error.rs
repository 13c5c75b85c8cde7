use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database is not open")]
    NotOpen,

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode database file: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Failed to encode database file: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Invalid metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Downloaded DB exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("The version of DB schema doesn't match: local {local}, expected {expected}")]
    SchemaMismatch { local: u32, expected: u32 },

    #[error("The first run cannot skip downloading DB")]
    MissingDatabase,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Database client error: {0}")]
    Client(String),
}

impl DbError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<reqwest::Error> for DbError {
    fn from(err: reqwest::Error) -> Self {
        Self::Download(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
