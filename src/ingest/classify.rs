// src/ingest/classify.rs
//! Route selection for a source: api, rss, scrape or skip.
//!
//! Rules are evaluated in a fixed order and the first match wins. Explicit
//! flags short-circuit before any network I/O. The content-type probe and the
//! robots.txt check both fail open: an unreachable host is never a reason to
//! skip, it simply falls through to the next rule.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use url::Url;

use crate::ingest::robots;
use crate::ingest::types::{ClassificationDecision, Reason, Route, SourceDescriptor};

pub const HEAD_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const GET_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Host lists and identity used while classifying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapePolicy {
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    pub user_agent: String,
}

/// Exact or subdomain match of `host` against any entry of `list`.
pub fn host_matches_any<S: AsRef<str>>(host: &str, list: &[S]) -> bool {
    if host.is_empty() {
        return false;
    }
    let h = host.to_ascii_lowercase();
    list.iter().any(|item| {
        let it = item.as_ref().trim().to_ascii_lowercase();
        !it.is_empty() && (h == it || h.ends_with(&format!(".{it}")))
    })
}

#[derive(Clone)]
pub struct SourceClassifier {
    client: Client,
    head_timeout: Duration,
    get_timeout: Duration,
}

impl SourceClassifier {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            head_timeout: HEAD_PROBE_TIMEOUT,
            get_timeout: GET_PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeouts(mut self, head: Duration, get: Duration) -> Self {
        self.head_timeout = head;
        self.get_timeout = get;
        self
    }

    pub async fn classify(
        &self,
        source: &SourceDescriptor,
        policy: &ScrapePolicy,
    ) -> ClassificationDecision {
        use crate::ingest::types::ClassificationDecision as D;

        let Some(raw_url) = source.url() else {
            return D::new(Route::Skip, Reason::NoUrl);
        };
        if source.force_api || source.kind_is("api") {
            return D::new(Route::Api, Reason::ExplicitApi);
        }
        if source.force_rss || source.kind_is("rss") {
            return D::new(Route::Rss, Reason::ExplicitRss);
        }
        if source.force_scrape {
            return D::new(Route::Scrape, Reason::ForceScrape);
        }

        let url = match Url::parse(raw_url) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(source = %source.name, url = raw_url, error = %e, "unparseable source url");
                return D::new(Route::Skip, Reason::InvalidUrl);
            }
        };
        let host = url.host_str().unwrap_or_default();

        if host_matches_any(host, &policy.blacklist) {
            return D::new(Route::Skip, Reason::Blacklisted);
        }
        if !policy.whitelist.is_empty() && !host_matches_any(host, &policy.whitelist) {
            return D::new(Route::Skip, Reason::NotInWhitelist);
        }

        let ct = self
            .probe_content_type(url.as_str(), &policy.user_agent)
            .await
            .to_ascii_lowercase();
        if ct.contains("json") {
            return D::new(Route::Api, Reason::JsonEndpoint);
        }
        if ct.contains("xml") || ct.contains("rss") {
            return D::new(Route::Rss, Reason::RssEndpoint);
        }

        if !robots::robots_allows(&self.client, &url, &policy.user_agent).await {
            return D::new(Route::Skip, Reason::RobotsDisallow);
        }
        if source.disallow_scrape {
            return D::new(Route::Skip, Reason::DisallowScrape);
        }
        match source.allow_scrape {
            Some(true) => D::new(Route::Scrape, Reason::AllowScrape),
            Some(false) => D::new(Route::Skip, Reason::ExplicitDisallow),
            None => D::new(Route::Scrape, Reason::HtmlAllowed),
        }
    }

    /// `Content-Type` of `url`: HEAD first, GET when HEAD fails at the
    /// transport level. Empty when both fail.
    pub async fn probe_content_type(&self, url: &str, user_agent: &str) -> String {
        let head = self
            .client
            .head(url)
            .header(USER_AGENT, user_agent)
            .timeout(self.head_timeout)
            .send()
            .await;
        let resp = match head {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(url, error = %e, "HEAD probe failed; retrying with GET");
                match self
                    .client
                    .get(url)
                    .header(USER_AGENT, user_agent)
                    .timeout(self.get_timeout)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::debug!(url, error = %e, "GET probe failed");
                        return String::new();
                    }
                }
            }
        };
        resp.headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }
}
