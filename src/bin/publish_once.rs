use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use publish_pipeline::{config, db, pipeline};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run the publish pipeline once and print the run summary as JSON"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the full per-record report instead of the counts only
    #[arg(long)]
    verbose: bool,
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
    let pipeline = pipeline::from_config(&cfg, Arc::new(db::SqliteStore::new(pool)))?;

    // Act as the scheduler: present the configured secret.
    let authorization = format!("Bearer {}", cfg.publish.cron_secret);
    match pipeline.run(Some(&authorization)).await {
        Ok(summary) => {
            info!(published = summary.published_count, "run complete");
            let out = if args.verbose {
                serde_json::to_string_pretty(&summary)?
            } else {
                serde_json::json!({
                    "published": summary.published_count,
                    "revalidation_failures": summary.revalidation_failures,
                    "indexing_failures": summary.indexing_failures,
                })
                .to_string()
            };
            println!("{out}");
            Ok(())
        }
        Err(err) => {
            error!(%err, "run failed");
            Err(err.into())
        }
    }
}
