// src/ingest/mod.rs
pub mod classify;
pub mod config;
pub mod dedup;
pub mod feed;
pub mod fetch;
pub mod normalize;
pub mod robots;
pub mod scheduler;
pub mod scrape;
pub mod store;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use reqwest::Client;

use crate::config::PipelineConfig;
use crate::ingest::classify::ScrapePolicy;
use crate::ingest::dedup::{merge, JobIndex};
use crate::ingest::fetch::{FetchOrchestrator, FetchReport};
use crate::ingest::normalize::NormalizerRegistry;
use crate::ingest::scrape::browser::BrowserLauncher;
use crate::ingest::scrape::{default_capabilities, ScrapeOrchestrator};
use crate::ingest::store::{
    read_doc, read_jobs, write_doc, DocumentStore, ReviewDocument, SourcesDocument, API_JOBS,
    INDEX, MANUAL_REVIEW, SCRAPED_JOBS, SOURCES_TO_SCRAPE,
};
use crate::ingest::types::{CanonicalJob, SourceDescriptor, SourceRef};

/// One-time metrics registration (so series show up in the snapshot).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_sources_total", "Sources processed by the fetch stage.");
        describe_counter!(
            "ingest_route_total",
            "Classifier decisions, labelled by route and reason."
        );
        describe_counter!(
            "ingest_fetched_jobs_total",
            "Jobs normalized from api and rss sources."
        );
        describe_counter!(
            "ingest_source_errors_total",
            "Sources whose fetch or parse failed."
        );
        describe_histogram!("ingest_fetch_ms", "Per-source fetch+parse time in milliseconds.");
        describe_histogram!("ingest_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!("scrape_jobs_total", "Jobs produced by scrape capabilities.");
        describe_counter!(
            "scrape_host_errors_total",
            "Hosts whose scrape failed, timed out, or could not launch a browser."
        );
        describe_counter!(
            "scrape_missing_capability_total",
            "Scrape candidates with no capability for their host."
        );
        describe_counter!(
            "index_dedup_dropped_total",
            "Records dropped by identity-key deduplication."
        );
        describe_counter!("ingest_runs_total", "Scheduled pipeline runs.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the pipeline last finished a run."
        );
    });
}

/// Everything a single pipeline run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub fetch: FetchReport,
    pub scraped: Vec<CanonicalJob>,
    pub index: JobIndex,
}

/// fetch → scrape → merge over a fixed set of sources.
pub struct Pipeline {
    sources: Vec<SourceDescriptor>,
    policy: ScrapePolicy,
    fetcher: FetchOrchestrator,
    scraper: Option<ScrapeOrchestrator>,
}

impl Pipeline {
    pub fn new(sources: Vec<SourceDescriptor>, policy: ScrapePolicy, fetcher: FetchOrchestrator) -> Self {
        ensure_metrics_described();
        Self {
            sources,
            policy,
            fetcher,
            scraper: None,
        }
    }

    pub fn with_scraper(mut self, scraper: ScrapeOrchestrator) -> Self {
        self.scraper = Some(scraper);
        self
    }

    /// Wire orchestrators from configuration. Without a launcher the scrape
    /// stage is disabled.
    pub fn from_config(
        cfg: &PipelineConfig,
        client: Client,
        launcher: Option<Arc<dyn BrowserLauncher>>,
    ) -> Self {
        let normalizers = NormalizerRegistry::new(cfg.id_strategy);
        let fetcher = FetchOrchestrator::new(client, normalizers)
            .with_timeout(cfg.fetch_timeout)
            .with_concurrency(cfg.fetch_concurrency);
        let pipeline = Self::new(cfg.sources.clone(), cfg.policy(), fetcher);
        match launcher {
            Some(l) => pipeline.with_scraper(
                ScrapeOrchestrator::new(default_capabilities(), l, normalizers)
                    .with_timeout(cfg.scrape_timeout)
                    .with_concurrency(cfg.scrape_concurrency),
            ),
            None => pipeline,
        }
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn policy(&self) -> &ScrapePolicy {
        &self.policy
    }

    pub fn fetcher(&self) -> &FetchOrchestrator {
        &self.fetcher
    }

    pub fn scrape_enabled(&self) -> bool {
        self.scraper.is_some()
    }

    pub async fn fetch(&self) -> FetchReport {
        self.fetcher.run(&self.sources, &self.policy).await
    }

    pub async fn scrape(&self, to_scrape: &[SourceRef]) -> Vec<CanonicalJob> {
        match &self.scraper {
            Some(s) => s.run(to_scrape).await,
            None => {
                if !to_scrape.is_empty() {
                    tracing::warn!(
                        candidates = to_scrape.len(),
                        "scrape stage disabled (no browser endpoint); skipping candidates"
                    );
                }
                Vec::new()
            }
        }
    }

    /// Full run. API/RSS results take precedence over scraped ones on merge.
    pub async fn run_once(&self) -> RunReport {
        let fetch = self.fetch().await;
        let scraped = self.scrape(&fetch.to_scrape).await;
        let index = JobIndex::build([fetch.fetched.clone(), scraped.clone()]);

        gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
        tracing::info!(
            target: "ingest",
            fetched = fetch.fetched.len(),
            scraped = scraped.len(),
            indexed = index.count,
            manual_review = fetch.manual_review.len(),
            failed = fetch.failed.len(),
            "pipeline run finished"
        );

        RunReport {
            fetch,
            scraped,
            index,
        }
    }
}

/// Write `api_jobs.json` (deduplicated), `sources_to_scrape.json` and
/// `manual_review.json`.
pub async fn persist_fetch(store: &dyn DocumentStore, report: &FetchReport) -> Result<()> {
    let api = JobIndex::new(merge([report.fetched.clone()]));
    write_doc(store, API_JOBS, &api).await?;
    write_doc(
        store,
        SOURCES_TO_SCRAPE,
        &SourcesDocument::new(report.to_scrape.clone()),
    )
    .await?;
    write_doc(
        store,
        MANUAL_REVIEW,
        &ReviewDocument::new(report.manual_review.clone()),
    )
    .await?;
    Ok(())
}

pub async fn persist_run(store: &dyn DocumentStore, report: &RunReport) -> Result<()> {
    persist_fetch(store, &report.fetch).await?;
    write_doc(store, SCRAPED_JOBS, &JobIndex::new(report.scraped.clone())).await?;
    write_doc(store, INDEX, &report.index).await?;
    Ok(())
}

/// Scrape the candidates recorded by a previous fetch.
pub async fn scrape_from_store(pipeline: &Pipeline, store: &dyn DocumentStore) -> Result<JobIndex> {
    let candidates = read_doc::<SourcesDocument>(store, SOURCES_TO_SCRAPE)
        .await?
        .map(|d| d.sources)
        .unwrap_or_default();
    let scraped = JobIndex::new(pipeline.scrape(&candidates).await);
    write_doc(store, SCRAPED_JOBS, &scraped).await?;
    Ok(scraped)
}

/// Merge stored `api_jobs.json` then `scraped_jobs.json` into `index.json`.
pub async fn build_index(store: &dyn DocumentStore) -> Result<JobIndex> {
    let api = read_jobs(store, API_JOBS).await?;
    let scraped = read_jobs(store, SCRAPED_JOBS).await?;
    let index = JobIndex::build([api.jobs, scraped.jobs]);
    write_doc(store, INDEX, &index).await?;
    tracing::info!(target: "ingest", count = index.count, "index written");
    Ok(index)
}
