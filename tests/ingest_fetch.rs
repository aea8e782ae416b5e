// tests/ingest_fetch.rs
use job_indexer::ingest::classify::ScrapePolicy;
use job_indexer::ingest::fetch::FetchOrchestrator;
use job_indexer::ingest::normalize::NormalizerRegistry;
use job_indexer::ingest::types::{Reason, SourceDescriptor, SourceType};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Jobs</title>
    <item>
      <title>Rust &amp; Go Engineer</title>
      <link>https://x/1</link>
      <dc:creator>Acme</dc:creator>
      <pubDate>Mon, 15 Jan 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Designer</title>
    </item>
  </channel>
</rss>"#;

fn orchestrator() -> FetchOrchestrator {
    FetchOrchestrator::new(reqwest::Client::new(), NormalizerRegistry::default())
}

fn api(name: &str, url: String, kind: &str) -> SourceDescriptor {
    SourceDescriptor {
        name: name.into(),
        url: Some(url),
        kind: Some(kind.into()),
        force_api: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn greenhouse_payload_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/boards/acme/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobs": [{
                "id": 4012,
                "title": "Backend Engineer",
                "absolute_url": "https://boards.example/acme/4012",
                "location": {"name": "Remote"},
                "updated_at": "2024-01-15T10:00:00-05:00"
            }]
        })))
        .mount(&server)
        .await;

    let src = api(
        "acme",
        format!("{}/boards/acme/jobs", server.uri()),
        "greenhouse",
    );
    let report = orchestrator().run(&[src], &ScrapePolicy::default()).await;

    assert_eq!(report.fetched.len(), 1);
    let job = &report.fetched[0];
    assert_eq!(job.id, "4012");
    assert_eq!(job.title.as_deref(), Some("Backend Engineer"));
    assert_eq!(job.location.as_deref(), Some("Remote"));
    assert_eq!(job.posted_at.as_deref(), Some("2024-01-15T15:00:00.000Z"));
    assert_eq!(job.source, "acme");
    assert_eq!(job.source_type, SourceType::Api);
}

#[tokio::test]
async fn rss_feed_by_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/rss+xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FEED, "application/rss+xml"))
        .mount(&server)
        .await;

    let src = SourceDescriptor {
        name: "board".into(),
        url: Some(format!("{}/feed", server.uri())),
        ..Default::default()
    };
    let report = orchestrator().run(&[src], &ScrapePolicy::default()).await;

    assert_eq!(report.fetched.len(), 2);
    let first = &report.fetched[0];
    assert_eq!(first.id, "https://x/1");
    assert_eq!(first.title.as_deref(), Some("Rust & Go Engineer"));
    assert_eq!(first.company.as_deref(), Some("Acme"));
    assert_eq!(first.source_type, SourceType::Rss);
    assert_eq!(first.posted_at.as_deref(), Some("2024-01-15T10:00:00.000Z"));
    assert_eq!(report.fetched[1].id, "board-Designer");
}

#[tokio::test]
async fn failing_source_does_not_abort_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{not json", "application/json"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"title": "Ok", "url": "https://x/ok"}])))
        .mount(&server)
        .await;

    let sources = vec![
        api("down", format!("{}/down", server.uri()), "api"),
        api("garbage", format!("{}/garbage", server.uri()), "api"),
        api("ok", format!("{}/ok", server.uri()), "api"),
    ];
    let report = orchestrator().run(&sources, &ScrapePolicy::default()).await;

    assert_eq!(report.fetched.len(), 1);
    assert_eq!(report.fetched[0].url.as_deref(), Some("https://x/ok"));
    assert_eq!(report.failed, vec!["down".to_string(), "garbage".to_string()]);
    assert!(report.to_scrape.is_empty());
    assert!(report.manual_review.is_empty());
}

#[tokio::test]
async fn path_to_jobs_drills_into_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lever"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"postings": [
                {"id": "p1", "text": "Platform Engineer", "hostedUrl": "https://jobs.lever.example/p1",
                 "categories": {"location": "Berlin"}, "createdAt": 1705312800000u64},
                {"id": "p2", "text": "SRE"}
            ]}
        })))
        .mount(&server)
        .await;

    let mut src = api("lever-co", format!("{}/lever", server.uri()), "lever");
    src.path_to_jobs = Some("data.postings".into());
    let report = orchestrator().run(&[src], &ScrapePolicy::default()).await;

    assert_eq!(report.fetched.len(), 2);
    assert_eq!(report.fetched[0].title.as_deref(), Some("Platform Engineer"));
    assert_eq!(report.fetched[0].location.as_deref(), Some("Berlin"));
    assert_eq!(
        report.fetched[0].posted_at.as_deref(),
        Some("2024-01-15T10:00:00.000Z")
    );
    assert_eq!(report.fetched[1].id, "p2");
}

#[serial_test::serial]
#[tokio::test]
async fn auth_headers_come_from_env() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .and(header("authorization", "Bearer s3cret"))
        .and(header("x-api-key", "k-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobs": [{"title": "Hidden"}]})))
        .mount(&server)
        .await;

    std::env::set_var("FETCH_TEST_TOKEN", "s3cret");
    std::env::set_var("FETCH_TEST_KEY", "k-123");

    let mut src = api("private", format!("{}/private", server.uri()), "api");
    src.auth_env = Some("FETCH_TEST_TOKEN".into());
    src.api_key_header = Some("x-api-key".into());
    src.api_key_env = Some("FETCH_TEST_KEY".into());
    let report = orchestrator().run(&[src], &ScrapePolicy::default()).await;

    std::env::remove_var("FETCH_TEST_TOKEN");
    std::env::remove_var("FETCH_TEST_KEY");

    assert_eq!(report.fetched.len(), 1);
    assert_eq!(report.fetched[0].title.as_deref(), Some("Hidden"));
}

#[tokio::test]
async fn routing_splits_scrape_and_review() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
        .mount(&server)
        .await;

    let base = server.uri();
    let sources = vec![
        SourceDescriptor {
            name: "forced".into(),
            url: Some("https://remoteok.com/remote-dev-jobs".into()),
            force_scrape: true,
            ..Default::default()
        },
        SourceDescriptor {
            name: "html".into(),
            url: Some(format!("{base}/careers")),
            ..Default::default()
        },
        SourceDescriptor {
            name: "no".into(),
            url: Some(format!("{base}/careers")),
            allow_scrape: Some(false),
            ..Default::default()
        },
        SourceDescriptor {
            name: "bad".into(),
            url: Some("not a url".into()),
            ..Default::default()
        },
    ];
    let report = orchestrator().run(&sources, &ScrapePolicy::default()).await;

    let scrape: Vec<_> = report.to_scrape.iter().map(|r| (r.name.as_str(), r.reason)).collect();
    assert_eq!(
        scrape,
        vec![("forced", Reason::ForceScrape), ("html", Reason::HtmlAllowed)]
    );
    let review: Vec<_> = report
        .manual_review
        .iter()
        .map(|r| (r.name.as_str(), r.reason))
        .collect();
    assert_eq!(
        review,
        vec![("no", Reason::ExplicitDisallow), ("bad", Reason::InvalidUrl)]
    );
    assert!(report.fetched.is_empty());
    assert!(report.failed.is_empty());
}
