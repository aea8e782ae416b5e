// src/ingest/store.rs
//! JSON documents produced by a run and the sinks they are written to.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::ingest::dedup::JobIndex;
use crate::ingest::types::SourceRef;

pub const API_JOBS: &str = "api_jobs.json";
pub const SOURCES_TO_SCRAPE: &str = "sources_to_scrape.json";
pub const MANUAL_REVIEW: &str = "manual_review.json";
pub const SCRAPED_JOBS: &str = "scraped_jobs.json";
pub const INDEX: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesDocument {
    pub generated_at: DateTime<Utc>,
    pub count: usize,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

impl SourcesDocument {
    pub fn new(sources: Vec<SourceRef>) -> Self {
        Self {
            generated_at: Utc::now(),
            count: sources.len(),
            sources,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDocument {
    pub generated_at: DateTime<Utc>,
    pub count: usize,
    #[serde(default)]
    pub items: Vec<SourceRef>,
}

impl ReviewDocument {
    pub fn new(items: Vec<SourceRef>) -> Self {
        Self {
            generated_at: Utc::now(),
            count: items.len(),
            items,
        }
    }
}

/// Somewhere named JSON documents can be stored.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn write(&self, name: &str, doc: &Value) -> Result<()>;

    /// `Ok(None)` when the document does not exist.
    async fn read(&self, name: &str) -> Result<Option<Value>>;
}

pub async fn write_doc<T: Serialize + Sync>(
    store: &dyn DocumentStore,
    name: &str,
    doc: &T,
) -> Result<()> {
    let value = serde_json::to_value(doc).with_context(|| format!("serializing {name}"))?;
    store.write(name, &value).await
}

/// Read and decode a document. Missing → `None`; malformed → error.
pub async fn read_doc<T: DeserializeOwned>(store: &dyn DocumentStore, name: &str) -> Result<Option<T>> {
    match store.read(name).await? {
        Some(v) => serde_json::from_value(v)
            .with_context(|| format!("decoding {name}"))
            .map(Some),
        None => Ok(None),
    }
}

pub async fn read_jobs(store: &dyn DocumentStore, name: &str) -> Result<JobIndex> {
    Ok(read_doc::<JobIndex>(store, name)
        .await?
        .unwrap_or_else(JobIndex::empty))
}

/// Files under a data directory; writes go through a temp file + rename.
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DocumentStore for FsStore {
    async fn write(&self, name: &str, doc: &Value) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));
        let body = serde_json::to_vec_pretty(doc)?;
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renaming into {}", path.display()))?;
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Option<Value>> {
        let path = self.dir.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing {}", path.display()))
                .map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}

// --- Test helper ---
#[derive(Default)]
pub struct MemoryStore {
    pub docs: std::sync::Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.docs.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn write(&self, name: &str, doc: &Value) -> Result<()> {
        self.docs.lock().unwrap().insert(name.to_string(), doc.clone());
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.get(name))
    }
}
