use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use prospector_common::Config;
use prospector_research::{
    pipeline::fetch::HttpFetcher, pipeline::proposals::JsonProposalParser, Worker, WorkerConfig,
};
use prospector_store::PgStore;

#[derive(Parser, Debug)]
#[command(name = "prospector-worker", about = "Research run worker")]
struct Cli {
    /// Process at most one job, then exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("prospector=info".parse()?))
        .init();

    let cli = Cli::parse();

    info!("Prospector research worker starting...");

    let config = Config::from_env();
    config.log_redacted();

    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;

    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
    let worker_id = format!("{}:{}", host, std::process::id());

    let fetcher = HttpFetcher::new(config.fetch_timeout_secs)?;
    let worker = Worker::new(
        Arc::new(store),
        Box::new(fetcher),
        Box::new(JsonProposalParser),
        WorkerConfig::from_config(&config, worker_id),
    );

    if cli.once {
        let claimed = worker.run_once().await?;
        info!(claimed, "single pass complete");
    } else {
        worker.run().await;
    }

    Ok(())
}
