// src/ingest/dedup.rs
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::ingest::types::CanonicalJob;

/// Key used to detect duplicates: url, else id, else `[title, company]`.
pub fn identity_key(job: &CanonicalJob) -> String {
    let non_empty = |s: &Option<String>| s.as_deref().filter(|v| !v.is_empty()).map(str::to_string);
    if let Some(url) = non_empty(&job.url) {
        return url;
    }
    if !job.id.is_empty() {
        return job.id.clone();
    }
    serde_json::to_string(&(&job.title, &job.company)).unwrap_or_default()
}

/// Merge batches in the given order. The first record seen for a key wins;
/// later records with the same key are dropped whole.
pub fn merge<I>(batches: I) -> Vec<CanonicalJob>
where
    I: IntoIterator<Item = Vec<CanonicalJob>>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    let mut dropped = 0u64;

    for batch in batches {
        for job in batch {
            if seen.insert(identity_key(&job)) {
                out.push(job);
            } else {
                dropped += 1;
            }
        }
    }

    counter!("index_dedup_dropped_total").increment(dropped);
    out
}

/// A timestamped, ordered collection of jobs (`index.json`, `api_jobs.json`,
/// `scraped_jobs.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobIndex {
    pub generated_at: DateTime<Utc>,
    pub count: usize,
    #[serde(default)]
    pub jobs: Vec<CanonicalJob>,
}

impl JobIndex {
    pub fn new(jobs: Vec<CanonicalJob>) -> Self {
        Self {
            generated_at: Utc::now(),
            count: jobs.len(),
            jobs,
        }
    }

    /// Build a fresh index from prioritized batches (API/RSS first, then scraped).
    pub fn build<I>(batches: I) -> Self
    where
        I: IntoIterator<Item = Vec<CanonicalJob>>,
    {
        Self::new(merge(batches))
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}
