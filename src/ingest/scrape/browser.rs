// src/ingest/scrape/browser.rs
//! Browser sessions used by scrape capabilities.
//!
//! A session is exclusively owned by one capability invocation and is closed
//! by the orchestrator whether the scrape succeeded, failed or timed out.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to `url` and return the rendered document HTML.
    async fn goto(&mut self, url: &str) -> Result<String>;

    /// Release the session. Called exactly once.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// Launches sessions backed by a Browserless `/content` endpoint: each
/// navigation is rendered by a headless Chrome on the Browserless side.
#[derive(Clone)]
pub struct BrowserlessLauncher {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl BrowserlessLauncher {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            timeout: Duration::from_secs(45),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl BrowserLauncher for BrowserlessLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let mut endpoint = Url::parse(&format!("{}/content", self.base_url))
            .with_context(|| format!("invalid browserless url {}", self.base_url))?;
        if let Some(ref token) = self.token {
            endpoint.query_pairs_mut().append_pair("token", token);
        }
        Ok(Box::new(BrowserlessSession {
            client: self.client.clone(),
            endpoint,
            timeout: self.timeout,
            pages: 0,
            closed: false,
        }))
    }
}

pub struct BrowserlessSession {
    client: Client,
    endpoint: Url,
    timeout: Duration,
    pages: usize,
    closed: bool,
}

#[async_trait]
impl BrowserSession for BrowserlessSession {
    async fn goto(&mut self, url: &str) -> Result<String> {
        if self.closed {
            return Err(anyhow!("browser session already closed"));
        }
        let body = serde_json::json!({
            "url": url,
            "gotoOptions": { "waitUntil": "domcontentloaded" },
        });

        let resp = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("browserless render of {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(anyhow!("browserless returned {status}: {message}"));
        }
        self.pages += 1;
        resp.text().await.context("reading rendered html")
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        tracing::debug!(pages = self.pages, "browser session closed");
        Ok(())
    }
}
