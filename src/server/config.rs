use crate::server::scheduler::DEFAULT_UPDATE_INTERVAL;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TOKEN_HEADER: &str = "Trivy-Token";
pub const DEFAULT_LISTEN: &str = "localhost:4954";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub listen: String,

    /// Cache directory holding `db/vuln.db` and `db/metadata.json`
    pub cache_dir: PathBuf,

    /// Shared secret required on every request. Empty disables the check.
    pub token: String,

    /// Header carrying the shared secret
    pub token_header: String,

    /// URL the database file is downloaded from
    pub db_repository: String,

    /// Version string reported to the database client
    pub app_version: String,

    /// Period between update cycles
    pub update_interval: Duration,

    /// Track the light database tier
    pub light: bool,

    /// Never download at startup; the cache must already hold a database
    pub skip_update: bool,
}

impl ServerConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            cache_dir: cache_dir.into(),
            token: String::new(),
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            db_repository: String::new(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
            light: false,
            skip_update: false,
        }
    }

    pub fn listen(mut self, listen: &str) -> Self {
        self.listen = listen.to_string();
        self
    }

    pub fn token(mut self, token: &str) -> Self {
        self.token = token.to_string();
        self
    }

    pub fn token_header(mut self, header: &str) -> Self {
        self.token_header = header.to_string();
        self
    }

    pub fn db_repository(mut self, url: &str) -> Self {
        self.db_repository = url.to_string();
        self
    }

    pub fn app_version(mut self, version: &str) -> Self {
        self.app_version = version.to_string();
        self
    }

    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn light(mut self, light: bool) -> Self {
        self.light = light;
        self
    }

    pub fn skip_update(mut self, skip: bool) -> Self {
        self.skip_update = skip;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.listen.is_empty() {
            return Err("listen address must not be empty".to_string());
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err("cache directory must not be empty".to_string());
        }
        if !self.token.is_empty() && self.token_header.is_empty() {
            return Err("token header must be set when a token is configured".to_string());
        }
        if self.token_header.parse::<http::HeaderName>().is_err() {
            return Err(format!("invalid token header '{}'", self.token_header));
        }
        if self.update_interval.is_zero() {
            return Err("update interval must be greater than 0".to_string());
        }
        if self.db_repository.is_empty() && !self.skip_update {
            return Err("DB repository is required unless updates are skipped".to_string());
        }
        Ok(())
    }
}
