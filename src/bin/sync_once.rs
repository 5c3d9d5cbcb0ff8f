use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use compass_sync::compass::CompassClient;
use compass_sync::config;
use compass_sync::db::{self, SqliteStore};
use compass_sync::sync::SyncJob;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run one full Compass sync over all tracked projects and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override `sync.page_size`
    #[arg(long)]
    page_size: Option<u32>,

    /// Print the full job report as JSON on stdout
    #[arg(long)]
    json: bool,
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
    if let Some(page_size) = args.page_size {
        cfg.sync.page_size = page_size;
        config::validate(&cfg)?;
    }
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let store = SqliteStore::new(pool);
    let client = CompassClient::from_config(&cfg)?;
    let report = SyncJob::new(&store, &client, &store, cfg.sync_options())
        .run()
        .await?;

    let failed_projects = report.failed_projects();
    if !failed_projects.is_empty() {
        warn!(count = failed_projects.len(), ids = ?failed_projects, "projects failed to sync");
    }
    let failed_pages = report.failed_pages();
    if !failed_pages.is_empty() {
        warn!(offsets = ?failed_pages, "pages were not persisted");
    }
    info!(
        pages = report.page_count(),
        records = report.records_persisted(),
        "sync finished"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
