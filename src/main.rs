//! job-indexer: binary entrypoint.
//! Classifies job sources, fetches and scrapes postings, and writes the
//! merged index under `DATA_DIR`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use job_indexer::config::PipelineConfig;
use job_indexer::ingest::scheduler::{spawn_scheduler, SchedulerCfg};
use job_indexer::ingest::scrape::browser::{BrowserLauncher, BrowserlessLauncher};
use job_indexer::ingest::store::{DocumentStore, FsStore};
use job_indexer::ingest::{build_index, persist_fetch, persist_run, scrape_from_store, Pipeline};
use job_indexer::metrics::Metrics;

#[derive(Parser, Debug)]
#[command(name = "job-indexer", version, about = "Job postings ingest pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, scrape and merge, then persist every document.
    Run {
        /// Repeat every N seconds instead of running once.
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Classify and fetch; writes api_jobs, sources_to_scrape and manual_review.
    Fetch,
    /// Scrape the stored scrape candidates into scraped_jobs.
    Scrape,
    /// Merge api_jobs then scraped_jobs into index.json.
    Index,
    /// Print one JSON line per source with its routing decision.
    Classify,
}

/// `RUST_LOG` filter (default `job_indexer=info,warn`), JSON output when
/// `LOG_FORMAT=json`.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("job_indexer=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

fn build_launcher(cfg: &PipelineConfig) -> Option<Arc<dyn BrowserLauncher>> {
    match &cfg.browserless {
        Some(b) => Some(Arc::new(
            BrowserlessLauncher::new(&b.url, b.token.as_deref()).with_timeout(cfg.scrape_timeout),
        )),
        None => {
            tracing::warn!("BROWSERLESS_URL not set; scrape stage disabled");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = PipelineConfig::from_env().context("loading configuration")?;
    let metrics = Metrics::init()?;

    let client = reqwest::Client::builder()
        .user_agent(cfg.user_agent.clone())
        .build()
        .context("building http client")?;
    let store: Arc<dyn DocumentStore> = Arc::new(FsStore::new(cfg.data_dir.clone()));

    let needs_sources = matches!(
        cli.command,
        Command::Run { .. } | Command::Fetch | Command::Classify
    );
    if needs_sources && cfg.sources.is_empty() {
        bail!("no job sources configured (set JOB_SOURCES or JOB_SOURCES_PATH)");
    }

    let launcher = match cli.command {
        Command::Run { .. } | Command::Scrape => build_launcher(&cfg),
        _ => None,
    };
    let pipeline = Pipeline::from_config(&cfg, client, launcher);

    match cli.command {
        Command::Run {
            interval_secs: Some(secs),
        } => {
            let handle = spawn_scheduler(
                SchedulerCfg::from_secs(secs),
                Arc::new(pipeline),
                store,
                Some((metrics, cfg.data_dir.clone())),
            );
            tokio::select! {
                res = handle => res.context("scheduler task ended")?,
                _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
            }
            return Ok(());
        }
        Command::Run {
            interval_secs: None,
        } => {
            let report = pipeline.run_once().await;
            persist_run(store.as_ref(), &report).await?;
        }
        Command::Fetch => {
            let report = pipeline.fetch().await;
            persist_fetch(store.as_ref(), &report).await?;
        }
        Command::Scrape => {
            scrape_from_store(&pipeline, store.as_ref()).await?;
        }
        Command::Index => {
            build_index(store.as_ref()).await?;
        }
        Command::Classify => {
            let classifier = pipeline.fetcher().classifier();
            for source in pipeline.sources() {
                let d = classifier.classify(source, pipeline.policy()).await;
                let line = serde_json::json!({
                    "name": source.name,
                    "url": source.url(),
                    "route": d.route,
                    "reason": d.reason,
                });
                println!("{line}");
            }
            return Ok(());
        }
    }

    metrics.write_snapshot(&cfg.data_dir).await?;
    Ok(())
}
