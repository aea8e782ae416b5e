// src/ingest/fetch.rs
//! Classify → fetch → parse → normalize, per source, through a bounded pool.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use futures::future::FutureExt;
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use serde_json::Value;

use crate::ingest::classify::{ScrapePolicy, SourceClassifier};
use crate::ingest::feed::parse_feed;
use crate::ingest::normalize::NormalizerRegistry;
use crate::ingest::types::{
    CanonicalJob, ClassificationDecision, Dialect, Route, SourceDescriptor, SourceRef, SourceType,
};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_FETCH_CONCURRENCY: usize = 6;

/// Result of one fetch pass. Every source lands in exactly one of: a
/// contributor to `fetched`, `to_scrape`, `manual_review`, or `failed`.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub fetched: Vec<CanonicalJob>,
    pub to_scrape: Vec<SourceRef>,
    pub manual_review: Vec<SourceRef>,
    /// Names of sources that errored and contributed nothing.
    pub failed: Vec<String>,
}

enum SourceOutcome {
    Fetched(Vec<CanonicalJob>),
    ToScrape(SourceRef),
    ManualReview(SourceRef),
    Failed(String),
}

/// Build per-source auth headers from named environment bindings.
/// Missing variables simply omit the header.
pub fn resolve_auth_headers<F>(source: &SourceDescriptor, lookup: F) -> HeaderMap
where
    F: Fn(&str) -> Option<String>,
{
    let mut headers = HeaderMap::new();

    if let Some(token) = source.auth_env.as_deref().and_then(&lookup) {
        let token = token.trim();
        let value = if token.starts_with("Bearer ") {
            token.to_string()
        } else {
            format!("Bearer {token}")
        };
        match HeaderValue::from_str(&value) {
            Ok(v) => {
                headers.insert(AUTHORIZATION, v);
            }
            Err(_) => tracing::warn!(source = %source.name, "auth token is not a valid header value"),
        }
    }

    if let (Some(name), Some(env)) = (source.api_key_header.as_deref(), source.api_key_env.as_deref()) {
        if let Some(key) = lookup(env) {
            match (
                HeaderName::from_bytes(name.trim().as_bytes()),
                HeaderValue::from_str(key.trim()),
            ) {
                (Ok(n), Ok(v)) => {
                    headers.insert(n, v);
                }
                _ => tracing::warn!(source = %source.name, header = name, "invalid api key header"),
            }
        }
    }

    headers
}

/// Locate the postings array inside a JSON payload.
///
/// `path_to_jobs` is a dotted accessor (numeric segments index arrays). When
/// it does not lead to an array, a `jobs` array under the drilled value and
/// then at the top level is tried; otherwise the result is empty.
pub fn extract_jobs<'a>(json: &'a Value, path_to_jobs: Option<&str>) -> &'a [Value] {
    let drilled = match path_to_jobs.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => path.split('.').try_fold(json, |cur, key| match cur {
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => cur.get(key),
        }),
        None => Some(json),
    };

    if let Some(Value::Array(items)) = drilled {
        return items;
    }
    if let Some(Value::Array(items)) = drilled.and_then(|d| d.get("jobs")) {
        return items;
    }
    if let Some(Value::Array(items)) = json.get("jobs") {
        return items;
    }
    &[]
}

#[derive(Clone)]
pub struct FetchOrchestrator {
    client: Client,
    classifier: SourceClassifier,
    normalizers: NormalizerRegistry,
    timeout: Duration,
    concurrency: usize,
}

impl FetchOrchestrator {
    pub fn new(client: Client, normalizers: NormalizerRegistry) -> Self {
        Self {
            classifier: SourceClassifier::new(client.clone()),
            client,
            normalizers,
            timeout: DEFAULT_FETCH_TIMEOUT,
            concurrency: DEFAULT_FETCH_CONCURRENCY,
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

    pub fn classifier(&self) -> &SourceClassifier {
        &self.classifier
    }

    /// Process all sources. Output order follows input order.
    pub async fn run(&self, sources: &[SourceDescriptor], policy: &ScrapePolicy) -> FetchReport {
        // boxed so the run future stays `Send` under tokio::spawn
        let futs: Vec<_> = sources
            .iter()
            .map(|source| self.process(source, policy).boxed())
            .collect();
        let outcomes: Vec<SourceOutcome> = stream::iter(futs)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut report = FetchReport::default();
        for outcome in outcomes {
            match outcome {
                SourceOutcome::Fetched(mut jobs) => report.fetched.append(&mut jobs),
                SourceOutcome::ToScrape(r) => report.to_scrape.push(r),
                SourceOutcome::ManualReview(r) => report.manual_review.push(r),
                SourceOutcome::Failed(name) => report.failed.push(name),
            }
        }

        tracing::info!(
            target: "ingest",
            sources = sources.len(),
            fetched = report.fetched.len(),
            to_scrape = report.to_scrape.len(),
            manual_review = report.manual_review.len(),
            failed = report.failed.len(),
            "fetch pass finished"
        );
        report
    }

    async fn process(&self, source: &SourceDescriptor, policy: &ScrapePolicy) -> SourceOutcome {
        counter!("ingest_sources_total").increment(1);

        let decision = self.classifier.classify(source, policy).await;
        counter!(
            "ingest_route_total",
            "route" => decision.route.as_str(),
            "reason" => decision.reason.as_str()
        )
        .increment(1);
        tracing::info!(
            source = %source.name,
            route = decision.route.as_str(),
            reason = decision.reason.as_str(),
            "classified source"
        );

        match decision.route {
            Route::Scrape => return SourceOutcome::ToScrape(source.to_ref(decision.reason)),
            Route::Skip if !decision.reason.is_fetchable() => {
                return SourceOutcome::ManualReview(source.to_ref(decision.reason))
            }
            _ => {}
        }

        let t0 = Instant::now();
        match self.fetch_source(source, decision, policy).await {
            Ok(jobs) => {
                histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
                counter!("ingest_fetched_jobs_total").increment(jobs.len() as u64);
                tracing::info!(source = %source.name, jobs = jobs.len(), "source fetched");
                SourceOutcome::Fetched(jobs)
            }
            Err(e) => {
                counter!("ingest_source_errors_total").increment(1);
                tracing::warn!(source = %source.name, error = ?e, "source failed; dropping");
                SourceOutcome::Failed(source.name.clone())
            }
        }
    }

    async fn fetch_source(
        &self,
        source: &SourceDescriptor,
        decision: ClassificationDecision,
        policy: &ScrapePolicy,
    ) -> Result<Vec<CanonicalJob>> {
        let url = source.url().context("source has no url")?;

        let resp = self
            .client
            .get(url)
            .headers(resolve_auth_headers(source, |k| std::env::var(k).ok()))
            .header(USER_AGENT, policy.user_agent.as_str())
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("{url} returned {status}");
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let body = resp.text().await.context("reading response body")?;

        let is_feed = content_type.contains("xml")
            || content_type.contains("rss")
            || decision.route == Route::Rss;

        if is_feed {
            let entries = parse_feed(&body)?;
            return Ok(entries
                .iter()
                .map(|entry| {
                    let raw = serde_json::to_value(entry).unwrap_or(Value::Null);
                    self.normalizers
                        .normalize(&raw, &source.name, SourceType::Rss, Dialect::Rss)
                })
                .collect());
        }

        let json: Value = serde_json::from_str(&body).context("parsing json payload")?;
        let dialect = Dialect::for_source(source);
        Ok(extract_jobs(&json, source.path_to_jobs.as_deref())
            .iter()
            .map(|item| {
                self.normalizers
                    .normalize(item, &source.name, SourceType::Api, dialect)
            })
            .collect())
    }
}
