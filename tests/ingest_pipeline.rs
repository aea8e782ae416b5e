// tests/ingest_pipeline.rs
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use job_indexer::ingest::classify::ScrapePolicy;
use job_indexer::ingest::fetch::FetchOrchestrator;
use job_indexer::ingest::normalize::NormalizerRegistry;
use job_indexer::ingest::scrape::browser::{BrowserLauncher, BrowserSession};
use job_indexer::ingest::scrape::{default_capabilities, ScrapeOrchestrator};
use job_indexer::ingest::store::{
    read_jobs, DocumentStore, FsStore, API_JOBS, INDEX, MANUAL_REVIEW, SCRAPED_JOBS,
    SOURCES_TO_SCRAPE,
};
use job_indexer::ingest::types::{SourceDescriptor, SourceType};
use job_indexer::ingest::{build_index, persist_fetch, persist_run, scrape_from_store, Pipeline};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
  <item><title>Engineer (feed)</title><link>https://x/1</link></item>
</channel></rss>"#;

const REMOTEOK_PAGE: &str = r#"<html><body><table id="jobsboard">
  <tr class="job"><td>
    <a class="preventLink" href="/remote-jobs/9-rust"><h2>Rust Dev</h2></a>
    <span class="companyLink"><h3>Ferris Inc</h3></span>
    <time datetime="2024-02-01T00:00:00+00:00">1d</time>
  </td></tr>
  <tr class="job"><td>
    <a class="preventLink" href="https://x/1"><h2>Engineer (scraped)</h2></a>
  </td></tr>
</table></body></html>"#;

struct StaticPage;

#[async_trait]
impl BrowserLauncher for StaticPage {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        Ok(Box::new(StaticSession))
    }
}

struct StaticSession;

#[async_trait]
impl BrowserSession for StaticSession {
    async fn goto(&mut self, _url: &str) -> Result<String> {
        Ok(REMOTEOK_PAGE.to_string())
    }
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

async fn mount_sources(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/gh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"title": "Engineer", "absolute_url": "https://x/1"}
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FEED, "text/plain"))
        .mount(server)
        .await;
}

fn sources(base: &str) -> Vec<SourceDescriptor> {
    vec![
        SourceDescriptor {
            name: "greenhouse-x".into(),
            url: Some(format!("{base}/gh")),
            kind: Some("greenhouse".into()),
            force_api: true,
            ..Default::default()
        },
        SourceDescriptor {
            name: "feed-x".into(),
            url: Some(format!("{base}/rss")),
            kind: Some("rss".into()),
            ..Default::default()
        },
        SourceDescriptor {
            name: "remoteok".into(),
            url: Some("https://remoteok.com/remote-dev-jobs".into()),
            force_scrape: true,
            ..Default::default()
        },
    ]
}

fn pipeline(base: &str, with_scraper: bool) -> Pipeline {
    let normalizers = NormalizerRegistry::default();
    let fetcher = FetchOrchestrator::new(reqwest::Client::new(), normalizers);
    let p = Pipeline::new(sources(base), ScrapePolicy::default(), fetcher);
    if with_scraper {
        p.with_scraper(ScrapeOrchestrator::new(
            default_capabilities(),
            Arc::new(StaticPage),
            normalizers,
        ))
    } else {
        p
    }
}

#[tokio::test]
async fn api_and_feed_with_same_url_collapse_to_one() {
    let server = MockServer::start().await;
    mount_sources(&server).await;

    let report = pipeline(&server.uri(), false).run_once().await;

    assert_eq!(report.fetch.fetched.len(), 2);
    let same: Vec<_> = report
        .index
        .jobs
        .iter()
        .filter(|j| j.url.as_deref() == Some("https://x/1"))
        .collect();
    assert_eq!(same.len(), 1);
    assert_eq!(same[0].title.as_deref(), Some("Engineer"));
    assert_eq!(same[0].source_type, SourceType::Api);
    assert_eq!(report.index.count, 1);
    // scrape stage disabled: the candidate is carried but not scraped
    assert_eq!(report.fetch.to_scrape.len(), 1);
    assert!(report.scraped.is_empty());
}

#[tokio::test]
async fn scraped_records_lose_to_api_records() {
    let server = MockServer::start().await;
    mount_sources(&server).await;

    let report = pipeline(&server.uri(), true).run_once().await;

    assert_eq!(report.scraped.len(), 2);
    assert!(report.scraped.iter().all(|j| j.source == "remoteok"));
    assert_eq!(report.index.count, 2);
    assert_eq!(report.index.jobs[0].url.as_deref(), Some("https://x/1"));
    assert_eq!(report.index.jobs[0].source_type, SourceType::Api);
    let rust = &report.index.jobs[1];
    assert_eq!(rust.title.as_deref(), Some("Rust Dev"));
    assert_eq!(rust.company.as_deref(), Some("Ferris Inc"));
    assert_eq!(rust.url.as_deref(), Some("https://remoteok.com/remote-jobs/9-rust"));
    assert_eq!(rust.posted_at.as_deref(), Some("2024-02-01T00:00:00.000Z"));
}

#[tokio::test]
async fn full_run_persists_every_document() {
    let server = MockServer::start().await;
    mount_sources(&server).await;
    let tmp = tempfile::tempdir().unwrap();
    let store = FsStore::new(tmp.path());

    let report = pipeline(&server.uri(), true).run_once().await;
    persist_run(&store, &report).await.unwrap();

    for name in [API_JOBS, SOURCES_TO_SCRAPE, MANUAL_REVIEW, SCRAPED_JOBS, INDEX] {
        assert!(tmp.path().join(name).exists(), "{name} missing");
    }
    let api = read_jobs(&store, API_JOBS).await.unwrap();
    assert_eq!(api.count, 1);
    let index = read_jobs(&store, INDEX).await.unwrap();
    assert_eq!(index.jobs, report.index.jobs);
}

#[tokio::test]
async fn staged_commands_match_a_full_run() {
    let server = MockServer::start().await;
    mount_sources(&server).await;
    let tmp = tempfile::tempdir().unwrap();
    let store = FsStore::new(tmp.path());
    let p = pipeline(&server.uri(), true);

    let fetch = p.fetch().await;
    persist_fetch(&store, &fetch).await.unwrap();
    let scraped = scrape_from_store(&p, &store).await.unwrap();
    assert_eq!(scraped.count, 2);
    let index = build_index(&store).await.unwrap();

    assert_eq!(index.count, 2);
    assert_eq!(index.jobs[0].source_type, SourceType::Api);
    let on_disk = store.read(INDEX).await.unwrap().unwrap();
    assert_eq!(on_disk["count"], 2);
}
