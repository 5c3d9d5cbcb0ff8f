use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use compass_sync::config;
use compass_sync::db;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Register project URLs (one per line) in the local project registry"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// File with one repository URL per line; blank lines and `#` comments are skipped
    input: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let content = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let mut imported = 0usize;
    for url in content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
    {
        db::insert_project(&pool, url).await?;
        imported += 1;
    }

    let total = db::count_projects(&pool).await?;
    info!(imported, total, "projects registered");
    Ok(())
}
