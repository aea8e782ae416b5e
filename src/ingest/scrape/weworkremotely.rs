// src/ingest/scrape/weworkremotely.rs
use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::browser::BrowserSession;
use super::{attr_or_text, resolve_href, select_text, RawPosting, ScrapeCapability};

const LISTING_URL: &str = "https://weworkremotely.com/categories/remote-programming-jobs";

static ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("section.jobs li.feature").expect("item selector"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("anchor selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("span.title").expect("title selector"));
static COMPANY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.company").expect("company selector"));
static REGION: Lazy<Selector> = Lazy::new(|| Selector::parse("span.region").expect("region selector"));
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").expect("time selector"));

pub struct WeWorkRemotely;

#[async_trait]
impl ScrapeCapability for WeWorkRemotely {
    fn host(&self) -> &'static str {
        "weworkremotely.com"
    }

    fn source_name(&self) -> &'static str {
        "weworkremotely"
    }

    async fn scrape(&self, session: &mut dyn BrowserSession) -> Result<Vec<RawPosting>> {
        let html = session.goto(LISTING_URL).await?;
        Ok(parse_listing(&html, LISTING_URL))
    }
}

pub fn parse_listing(html: &str, page_url: &str) -> Vec<RawPosting> {
    let doc = Html::parse_document(html);
    doc.select(&ITEM)
        .map(|item| {
            let anchor = item.select(&ANCHOR).next();
            let title = select_text(&item, &TITLE).or_else(|| {
                anchor
                    .as_ref()
                    .map(|a| crate::ingest::normalize::clean_text(&a.text().collect::<String>()))
                    .filter(|t| !t.is_empty())
            });
            RawPosting {
                title,
                company: select_text(&item, &COMPANY),
                url: anchor
                    .and_then(|a| a.value().attr("href"))
                    .and_then(|href| resolve_href(page_url, href)),
                posted_at: item
                    .select(&TIME)
                    .next()
                    .and_then(|t| attr_or_text(&t, "datetime")),
                location: select_text(&item, &REGION),
            }
        })
        .collect()
}
