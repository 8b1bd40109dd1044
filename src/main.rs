use anyhow::{Context, Result};
use clap::Parser;
use publish_pipeline::{config, db, pipeline, server};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about = "Serve the scheduled publish endpoint")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override `app.listen_addr`
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
    let cfg = config::load_with_env(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let pool = db::init_pool(&cfg.app.database_url).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(db::SqliteStore::new(pool));
    let pipeline = Arc::new(pipeline::from_config(&cfg, store)?);
    info!(
        indexing = cfg.indexing.credential().is_some(),
        batch_limit = cfg.publish.batch_limit,
        "publish pipeline ready"
    );

    let listen = args.listen.unwrap_or_else(|| cfg.app.listen_addr.clone());
    server::serve(&listen, server::router(pipeline)).await
}
