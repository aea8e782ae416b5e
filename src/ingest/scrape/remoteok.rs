// src/ingest/scrape/remoteok.rs
use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::browser::BrowserSession;
use super::{attr_or_text, resolve_href, select_text, RawPosting, ScrapeCapability};

const LISTING_URL: &str = "https://remoteok.com/remote-dev-jobs";

static ROW: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table#jobsboard tr.job").expect("row selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h2").expect("title selector"));
static COMPANY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".companyLink h3").expect("company selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a.preventLink").expect("link selector"));
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").expect("time selector"));

pub struct RemoteOk;

#[async_trait]
impl ScrapeCapability for RemoteOk {
    fn host(&self) -> &'static str {
        "remoteok.com"
    }

    fn source_name(&self) -> &'static str {
        "remoteok"
    }

    async fn scrape(&self, session: &mut dyn BrowserSession) -> Result<Vec<RawPosting>> {
        let html = session.goto(LISTING_URL).await?;
        Ok(parse_listing(&html, LISTING_URL))
    }
}

pub fn parse_listing(html: &str, page_url: &str) -> Vec<RawPosting> {
    let doc = Html::parse_document(html);
    doc.select(&ROW)
        .map(|row| RawPosting {
            title: select_text(&row, &TITLE),
            company: select_text(&row, &COMPANY),
            url: row
                .select(&LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| resolve_href(page_url, href)),
            posted_at: row
                .select(&TIME)
                .next()
                .and_then(|t| attr_or_text(&t, "datetime")),
            location: None,
        })
        .collect()
}
