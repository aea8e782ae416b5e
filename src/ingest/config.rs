// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

use crate::ingest::scrape::host_key;
use crate::ingest::types::SourceDescriptor;

/// Load source descriptors from an explicit path. Supports TOML
/// (`[[sources]]` tables) or JSON (array, or `{"sources": [...]}`).
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceDescriptor>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
        .with_context(|| format!("parsing sources in {}", path.display()))
}

pub fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceDescriptor>> {
    let trimmed = s.trim_start();
    let looks_json = trimmed.starts_with('[') || trimmed.starts_with('{');

    let parsed = if hint_ext == "toml" || (hint_ext != "json" && !looks_json) {
        parse_toml(s)
    } else {
        parse_json(s)
    };
    Ok(clean_sources(parsed?))
}

fn parse_toml(s: &str) -> Result<Vec<SourceDescriptor>> {
    #[derive(serde::Deserialize)]
    struct TomlSources {
        #[serde(default)]
        sources: Vec<SourceDescriptor>,
    }
    let v: TomlSources = toml::from_str(s).map_err(|e| anyhow!("invalid sources toml: {e}"))?;
    Ok(v.sources)
}

fn parse_json(s: &str) -> Result<Vec<SourceDescriptor>> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum JsonSources {
        List(Vec<SourceDescriptor>),
        Wrapped { sources: Vec<SourceDescriptor> },
    }
    let v: JsonSources =
        serde_json::from_str(s).map_err(|e| anyhow!("invalid sources json: {e}"))?;
    Ok(match v {
        JsonSources::List(l) => l,
        JsonSources::Wrapped { sources } => sources,
    })
}

/// Trim names and give unnamed sources a name derived from their host.
fn clean_sources(items: Vec<SourceDescriptor>) -> Vec<SourceDescriptor> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, mut src)| {
            src.name = src.name.trim().to_string();
            if src.name.is_empty() {
                src.name = src
                    .url()
                    .and_then(host_key)
                    .unwrap_or_else(|| format!("source-{}", i + 1));
            }
            src
        })
        .collect()
}

/// Comma-separated host list → trimmed, lower-cased, deduplicated.
pub fn parse_host_list(s: &str) -> Vec<String> {
    use std::collections::BTreeSet;
    let set: BTreeSet<String> = s
        .split(',')
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect();
    set.into_iter().collect()
}
