use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vulndb_server::server::config::{DEFAULT_LISTEN, DEFAULT_TOKEN_HEADER};
use vulndb_server::{RemoteDbClient, ServerConfig, server};

#[derive(Parser)]
#[command(name = "vulndb-server")]
#[command(about = "Vulnerability lookup server with background DB hot updates")]
#[command(version)]
struct Cli {
    /// Listen address
    #[arg(long, env = "VULNDB_LISTEN", default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Cache directory
    #[arg(long, env = "VULNDB_CACHE_DIR", default_value = "./cache")]
    cache_dir: PathBuf,

    /// Token required on every request; empty disables authentication
    #[arg(long, env = "VULNDB_TOKEN", default_value = "")]
    token: String,

    /// Header carrying the token
    #[arg(long, env = "VULNDB_TOKEN_HEADER", default_value = DEFAULT_TOKEN_HEADER)]
    token_header: String,

    /// URL of the database file
    #[arg(long, env = "VULNDB_DB_REPOSITORY", default_value = "")]
    db_repository: String,

    /// Seconds between update checks
    #[arg(long, env = "VULNDB_UPDATE_INTERVAL_SECS", default_value_t = 3600)]
    update_interval_secs: u64,

    /// Use the light database
    #[arg(long, env = "VULNDB_LIGHT")]
    light: bool,

    /// Skip the database download at startup
    #[arg(long, env = "VULNDB_SKIP_UPDATE")]
    skip_update: bool,

    /// Debug logging
    #[arg(short, long, env = "VULNDB_DEBUG")]
    debug: bool,

    /// Only log errors
    #[arg(short, long, env = "VULNDB_QUIET")]
    quiet: bool,
}

fn init_logging(debug: bool, quiet: bool) {
    let default_level = if debug {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.quiet);

    let config = ServerConfig::new(cli.cache_dir)
        .listen(&cli.listen)
        .token(&cli.token)
        .token_header(&cli.token_header)
        .db_repository(&cli.db_repository)
        .update_interval(Duration::from_secs(cli.update_interval_secs))
        .light(cli.light)
        .skip_update(cli.skip_update);

    let client = RemoteDbClient::new(&config.db_repository, &config.cache_dir)
        .context("failed to build DB client")?
        .light(config.light);

    server::listen_and_serve(config, Arc::new(client))
        .await
        .context("server failed")?;
    Ok(())
}
