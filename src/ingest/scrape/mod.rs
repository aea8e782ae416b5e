// src/ingest/scrape/mod.rs
//! Browser-driven scraping of sources the classifier routed to `scrape`.
//!
//! Each supported site is a [`ScrapeCapability`] keyed by its host. The map is
//! built once at startup; hosts without a capability are skipped.

pub mod browser;
pub mod remoteok;
pub mod weworkremotely;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::FutureExt;
use futures::stream::{self, StreamExt};
use metrics::counter;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ingest::normalize::{clean_text, NormalizerRegistry};
use crate::ingest::types::{CanonicalJob, Dialect, SourceRef, SourceType};
use browser::{BrowserLauncher, BrowserSession};

pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SCRAPE_CONCURRENCY: usize = 2;

/// What a capability extracts from one listing row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPosting {
    pub title: Option<String>,
    pub company: Option<String>,
    pub url: Option<String>,
    pub posted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[async_trait]
pub trait ScrapeCapability: Send + Sync {
    /// Host key this capability serves (no `www.`, lower-case).
    fn host(&self) -> &'static str;

    /// Value written to `CanonicalJob::source`.
    fn source_name(&self) -> &'static str;

    async fn scrape(&self, session: &mut dyn BrowserSession) -> Result<Vec<RawPosting>>;
}

pub type CapabilityMap = HashMap<String, Arc<dyn ScrapeCapability>>;

/// Capabilities for every site this crate knows how to scrape.
pub fn default_capabilities() -> CapabilityMap {
    capability_map(vec![
        Arc::new(remoteok::RemoteOk),
        Arc::new(weworkremotely::WeWorkRemotely),
    ])
}

pub fn capability_map(caps: Vec<Arc<dyn ScrapeCapability>>) -> CapabilityMap {
    caps.into_iter()
        .map(|c| (c.host().to_string(), c))
        .collect()
}

/// Lower-cased hostname without a leading `www.`.
pub fn host_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let key = host.strip_prefix("www.").unwrap_or(&host).to_string();
    (!key.is_empty()).then_some(key)
}

pub(crate) fn select_text(el: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel)
        .next()
        .map(|e| clean_text(&e.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

pub(crate) fn attr_or_text(el: &ElementRef<'_>, attr: &str) -> Option<String> {
    el.value()
        .attr(attr)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            let t = clean_text(&el.text().collect::<String>());
            (!t.is_empty()).then_some(t)
        })
}

pub(crate) fn resolve_href(page_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    Url::parse(page_url)
        .and_then(|base| base.join(href))
        .ok()
        .map(|u| u.to_string())
}

pub struct ScrapeOrchestrator {
    capabilities: CapabilityMap,
    launcher: Arc<dyn BrowserLauncher>,
    normalizers: NormalizerRegistry,
    timeout: Duration,
    concurrency: usize,
}

impl ScrapeOrchestrator {
    pub fn new(
        capabilities: CapabilityMap,
        launcher: Arc<dyn BrowserLauncher>,
        normalizers: NormalizerRegistry,
    ) -> Self {
        Self {
            capabilities,
            launcher,
            normalizers,
            timeout: DEFAULT_SCRAPE_TIMEOUT,
            concurrency: DEFAULT_SCRAPE_CONCURRENCY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Scrape every distinct host in `to_scrape` once, in first-seen order.
    pub async fn run(&self, to_scrape: &[SourceRef]) -> Vec<CanonicalJob> {
        let mut seen = HashSet::new();
        let hosts: Vec<String> = to_scrape
            .iter()
            .filter_map(|s| {
                let key = s.url.as_deref().and_then(host_key);
                if key.is_none() {
                    tracing::debug!(source = %s.name, "scrape candidate without a usable url");
                }
                key
            })
            .filter(|h| seen.insert(h.clone()))
            .collect();

        let batches: Vec<Vec<CanonicalJob>> = stream::iter(hosts)
            .map(|host| self.scrape_host(host).boxed())
            .buffered(self.concurrency)
            .collect()
            .await;

        let jobs: Vec<CanonicalJob> = batches.into_iter().flatten().collect();
        tracing::info!(target: "ingest", jobs = jobs.len(), "scrape pass finished");
        jobs
    }

    async fn scrape_host(&self, host: String) -> Vec<CanonicalJob> {
        let Some(cap) = self.capabilities.get(&host) else {
            tracing::info!(host = %host, "no scraper available for host; skipping");
            counter!("scrape_missing_capability_total").increment(1);
            return Vec::new();
        };

        let mut session = match self.launcher.launch().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(host = %host, error = ?e, "browser launch failed");
                counter!("scrape_host_errors_total").increment(1);
                return Vec::new();
            }
        };

        let outcome = tokio::time::timeout(self.timeout, cap.scrape(session.as_mut())).await;
        if let Err(e) = session.close().await {
            tracing::warn!(host = %host, error = ?e, "browser session did not close cleanly");
        }

        let raw = match outcome {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(host = %host, error = ?e, "scraper failed");
                counter!("scrape_host_errors_total").increment(1);
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(host = %host, timeout_secs = self.timeout.as_secs(), "scraper timed out");
                counter!("scrape_host_errors_total").increment(1);
                return Vec::new();
            }
        };

        let crawl_time = Utc::now();
        let jobs: Vec<CanonicalJob> = raw
            .iter()
            .map(|posting| {
                let value = serde_json::to_value(posting).unwrap_or(serde_json::Value::Null);
                self.normalizers.normalize_at(
                    &value,
                    cap.source_name(),
                    SourceType::Scraped,
                    Dialect::Scraped,
                    crawl_time,
                )
            })
            .collect();

        counter!("scrape_jobs_total").increment(jobs.len() as u64);
        tracing::info!(host = %host, jobs = jobs.len(), "host scraped");
        jobs
    }
}
