// src/config/pipeline.rs
use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::classify::ScrapePolicy;
use crate::ingest::config::{load_sources_from, parse_host_list, parse_sources};
use crate::ingest::fetch::{DEFAULT_FETCH_CONCURRENCY, DEFAULT_FETCH_TIMEOUT};
use crate::ingest::normalize::IdStrategy;
use crate::ingest::scrape::{DEFAULT_SCRAPE_CONCURRENCY, DEFAULT_SCRAPE_TIMEOUT};
use crate::ingest::types::SourceDescriptor;

pub const ENV_DATA_DIR: &str = "DATA_DIR";
pub const ENV_JOB_SOURCES: &str = "JOB_SOURCES";
pub const ENV_JOB_SOURCES_PATH: &str = "JOB_SOURCES_PATH";

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_USER_AGENT: &str = "job-indexer/0.1";
pub const DEFAULT_SOURCES_PATHS: [&str; 2] = ["config/sources.toml", "config/sources.json"];

/// Rendering endpoint for the scrape stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserlessCfg {
    pub url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub sources: Vec<SourceDescriptor>,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    pub user_agent: String,
    pub fetch_concurrency: usize,
    pub scrape_concurrency: usize,
    pub fetch_timeout: Duration,
    pub scrape_timeout: Duration,
    /// `None` disables the scrape stage.
    pub browserless: Option<BrowserlessCfg>,
    pub id_strategy: IdStrategy,
}

impl PipelineConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`from_env`](Self::from_env) but with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = get(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let sources = resolve_sources(get(ENV_JOB_SOURCES), get(ENV_JOB_SOURCES_PATH))?;

        let fetch_concurrency =
            parse_num(&get, "FETCH_CONCURRENCY", DEFAULT_FETCH_CONCURRENCY as u64)?.max(1) as usize;
        let scrape_concurrency =
            parse_num(&get, "SCRAPE_CONCURRENCY", DEFAULT_SCRAPE_CONCURRENCY as u64)?.max(1) as usize;
        let fetch_timeout = Duration::from_secs(parse_num(
            &get,
            "FETCH_TIMEOUT_SECS",
            DEFAULT_FETCH_TIMEOUT.as_secs(),
        )?);
        let scrape_timeout = Duration::from_secs(parse_num(
            &get,
            "SCRAPE_TIMEOUT_SECS",
            DEFAULT_SCRAPE_TIMEOUT.as_secs(),
        )?);

        let id_strategy = match get("ID_STRATEGY") {
            Some(s) => s.parse::<IdStrategy>()?,
            None => IdStrategy::default(),
        };

        let browserless = get("BROWSERLESS_URL").map(|url| BrowserlessCfg {
            url,
            token: get("BROWSERLESS_TOKEN"),
        });

        Ok(Self {
            data_dir,
            sources,
            whitelist: get("SCRAPE_WHITELIST")
                .map(|s| parse_host_list(&s))
                .unwrap_or_default(),
            blacklist: get("SCRAPE_BLACKLIST")
                .map(|s| parse_host_list(&s))
                .unwrap_or_default(),
            user_agent: get("SCRAPE_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            fetch_concurrency,
            scrape_concurrency,
            fetch_timeout,
            scrape_timeout,
            browserless,
            id_strategy,
        })
    }

    pub fn policy(&self) -> ScrapePolicy {
        ScrapePolicy {
            whitelist: self.whitelist.clone(),
            blacklist: self.blacklist.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

fn parse_num<G>(get: &G, key: &str, default: u64) -> Result<u64>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v
            .parse::<u64>()
            .map_err(|e| anyhow!("{key}={v:?} is not a non-negative integer: {e}")),
        None => Ok(default),
    }
}

fn resolve_sources(inline: Option<String>, path: Option<String>) -> Result<Vec<SourceDescriptor>> {
    match (inline, path) {
        (Some(_), Some(_)) => {
            bail!("set either {ENV_JOB_SOURCES} or {ENV_JOB_SOURCES_PATH}, not both")
        }
        (Some(json), None) => parse_sources(&json, "json")
            .with_context(|| format!("parsing {ENV_JOB_SOURCES}")),
        (None, Some(p)) => load_sources_from(Path::new(&p)),
        (None, None) => {
            for candidate in DEFAULT_SOURCES_PATHS {
                let p = Path::new(candidate);
                if p.exists() {
                    return load_sources_from(p);
                }
            }
            tracing::warn!("no job sources configured");
            Ok(Vec::new())
        }
    }
}
