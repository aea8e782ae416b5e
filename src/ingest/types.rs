// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One configured job source. Field names follow the camelCase keys used in
/// `JOB_SOURCES` / sources files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    /// ATS dialect: greenhouse | workable | zoho | lever | api | rss
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub path_to_jobs: Option<String>,
    #[serde(default)]
    pub force_api: bool,
    #[serde(default)]
    pub force_rss: bool,
    #[serde(default)]
    pub force_scrape: bool,
    #[serde(default)]
    pub allow_scrape: Option<bool>,
    #[serde(default)]
    pub disallow_scrape: bool,
    #[serde(default)]
    pub auth_env: Option<String>,
    #[serde(default)]
    pub api_key_header: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl SourceDescriptor {
    /// Case-insensitive check of the `type` field.
    pub fn kind_is(&self, kind: &str) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|k| k.trim().eq_ignore_ascii_case(kind))
    }

    /// Non-empty URL, if any.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn to_ref(&self, reason: Reason) -> SourceRef {
        SourceRef {
            name: self.name.clone(),
            url: self.url.clone(),
            reason,
        }
    }
}

/// Upstream schema a raw record is read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Greenhouse,
    Workable,
    Zoho,
    Lever,
    GenericApi,
    Rss,
    Scraped,
}

impl Dialect {
    /// Dialect for JSON payloads of a source. Absent or unknown `type` values
    /// fall back to the generic API dialect.
    pub fn for_source(source: &SourceDescriptor) -> Self {
        match source
            .kind
            .as_deref()
            .map(|k| k.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("greenhouse") => Dialect::Greenhouse,
            Some("workable") => Dialect::Workable,
            Some("zoho") => Dialect::Zoho,
            Some("lever") => Dialect::Lever,
            _ => Dialect::GenericApi,
        }
    }

    pub fn all() -> [Dialect; 7] {
        [
            Dialect::Greenhouse,
            Dialect::Workable,
            Dialect::Zoho,
            Dialect::Lever,
            Dialect::GenericApi,
            Dialect::Rss,
            Dialect::Scraped,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Api,
    Rss,
    Scraped,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Api => "api",
            SourceType::Rss => "rss",
            SourceType::Scraped => "scraped",
        }
    }
}

/// The normalized job record every dialect converges to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalJob {
    pub id: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub posted_at: Option<String>,
    pub source: String,
    pub source_type: SourceType,
    pub crawl_time: DateTime<Utc>,
    #[serde(default)]
    pub raw: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Api,
    Rss,
    Scrape,
    Skip,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Api => "api",
            Route::Rss => "rss",
            Route::Scrape => "scrape",
            Route::Skip => "skip",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    #[serde(rename = "no-url")]
    NoUrl,
    #[serde(rename = "explicit-api")]
    ExplicitApi,
    #[serde(rename = "explicit-rss")]
    ExplicitRss,
    #[serde(rename = "forceScrape")]
    ForceScrape,
    #[serde(rename = "invalid-url")]
    InvalidUrl,
    #[serde(rename = "blacklisted")]
    Blacklisted,
    #[serde(rename = "not-in-whitelist")]
    NotInWhitelist,
    #[serde(rename = "json-endpoint")]
    JsonEndpoint,
    #[serde(rename = "rss-endpoint")]
    RssEndpoint,
    #[serde(rename = "robots-disallow")]
    RobotsDisallow,
    #[serde(rename = "disallowScrape")]
    DisallowScrape,
    #[serde(rename = "allowScrape")]
    AllowScrape,
    #[serde(rename = "explicit-disallow")]
    ExplicitDisallow,
    #[serde(rename = "html-allowed")]
    HtmlAllowed,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::NoUrl => "no-url",
            Reason::ExplicitApi => "explicit-api",
            Reason::ExplicitRss => "explicit-rss",
            Reason::ForceScrape => "forceScrape",
            Reason::InvalidUrl => "invalid-url",
            Reason::Blacklisted => "blacklisted",
            Reason::NotInWhitelist => "not-in-whitelist",
            Reason::JsonEndpoint => "json-endpoint",
            Reason::RssEndpoint => "rss-endpoint",
            Reason::RobotsDisallow => "robots-disallow",
            Reason::DisallowScrape => "disallowScrape",
            Reason::AllowScrape => "allowScrape",
            Reason::ExplicitDisallow => "explicit-disallow",
            Reason::HtmlAllowed => "html-allowed",
        }
    }

    /// Reasons that still lead to an API/RSS fetch attempt.
    pub fn is_fetchable(&self) -> bool {
        matches!(
            self,
            Reason::NoUrl
                | Reason::ExplicitApi
                | Reason::ExplicitRss
                | Reason::JsonEndpoint
                | Reason::RssEndpoint
        )
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationDecision {
    pub route: Route,
    pub reason: Reason,
}

impl ClassificationDecision {
    pub const fn new(route: Route, reason: Reason) -> Self {
        Self { route, reason }
    }
}

/// A source handed to the scrape stage or to manual review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub name: String,
    pub url: Option<String>,
    pub reason: Reason,
}
