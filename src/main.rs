use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use compass_sync::compass::CompassClient;
use compass_sync::config;
use compass_sync::db::{self, SqliteStore};
use compass_sync::server::{self, AppState};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override `server.listen` from the config file
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let mut cfg = config::load(Some(&args.config))?;
    if let Some(listen) = args.listen {
        cfg.server.listen = listen;
    }
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(SqliteStore::new(pool));
    let client = Arc::new(CompassClient::from_config(&cfg)?);
    let state = Arc::new(AppState::new(
        store.clone(),
        client,
        store,
        cfg.sync_options(),
    ));

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr()?).await?;
    info!(endpoint = %cfg.compass.endpoint, "starting compass sync service");
    server::serve(listener, state).await
}
